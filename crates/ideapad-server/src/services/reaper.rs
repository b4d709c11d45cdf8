//! IdleReaper - ends conversations nobody has used for a while
//!
//! A single background task ticks on `reap_interval` and asks the
//! orchestrator to end every conversation whose last activity is older than
//! `idle_timeout`. Busy conversations are skipped and looked at again on the
//! next tick.

use ideapad_core::SessionOrchestrator;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info};

/// Runs idle reaping for one orchestrator
pub struct IdleReaper {
    orchestrator: Arc<SessionOrchestrator>,
    idle_timeout: Duration,
    reap_interval: Duration,
    abort_handle: Mutex<Option<tokio::task::AbortHandle>>,
}

impl IdleReaper {
    pub fn new(
        orchestrator: Arc<SessionOrchestrator>,
        idle_timeout: Duration,
        reap_interval: Duration,
    ) -> Self {
        Self {
            orchestrator,
            idle_timeout,
            reap_interval,
            abort_handle: Mutex::new(None),
        }
    }

    /// Start the background task, replacing one already running
    pub async fn start(&self) {
        let mut slot = self.abort_handle.lock().await;
        if let Some(handle) = slot.take() {
            handle.abort();
        }

        info!(
            idle_timeout_secs = self.idle_timeout.as_secs(),
            interval_secs = self.reap_interval.as_secs(),
            "Starting idle reaper"
        );

        let orchestrator = Arc::clone(&self.orchestrator);
        let idle_timeout = self.idle_timeout;
        let reap_interval = self.reap_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval(reap_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let sweep = orchestrator.reap_idle(idle_timeout).await;
                if sweep.ended.is_empty() {
                    debug!("No idle conversations");
                } else {
                    info!(
                        reaped = sweep.ended.len(),
                        release_failures = sweep.release_failures,
                        "Ended idle conversations"
                    );
                }
            }
        });

        *slot = Some(handle.abort_handle());
    }

    /// Stop the background task
    pub async fn stop(&self) {
        if let Some(handle) = self.abort_handle.lock().await.take() {
            handle.abort();
            info!("Stopped idle reaper");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.abort_handle.lock().await.is_some()
    }
}
