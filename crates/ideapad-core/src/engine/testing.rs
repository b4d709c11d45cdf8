//! Scriptable backend for unit tests.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::stub::reply_for;
use super::{EngineHandle, HandleTable, InferenceBackend};
use crate::config::SamplingConfig;
use crate::error::{Error, Result};

/// Backend whose failures are switched on and off by the test.
///
/// Any model source containing `missing` fails to load.
#[derive(Debug, Default)]
pub(crate) struct ScriptedBackend {
    handles: HandleTable,
    fail_complete: AtomicBool,
    malformed: AtomicBool,
    fail_release: AtomicBool,
    delay_ms: AtomicU64,
    loads: AtomicUsize,
    completions: AtomicUsize,
    releases: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_completions(&self, fail: bool) {
        self.fail_complete.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn malformed_responses(&self, malformed: bool) {
        self.malformed.store(malformed, Ordering::SeqCst);
    }

    pub(crate) fn fail_releases(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn delay_completions(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub(crate) fn completions(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    pub(crate) fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub(crate) async fn live_handles(&self) -> usize {
        self.handles.live_count().await
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn load(&self, model_source: &str, context_size: u32) -> Result<EngineHandle> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if model_source.contains("missing") {
            return Err(Error::engine_init(model_source, "no such model"));
        }
        Ok(self.handles.acquire(model_source, context_size).await)
    }

    async fn complete(
        &self,
        handle: &EngineHandle,
        prompt: &str,
        _params: &SamplingConfig,
    ) -> Result<String> {
        self.completions.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if !self.handles.is_live(handle).await {
            return Err(Error::engine_inference("handle released"));
        }
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(Error::engine_inference("scripted failure"));
        }
        if self.malformed.load(Ordering::SeqCst) {
            return super::parse_completion(&serde_json::json!({"choices": []}));
        }
        Ok(reply_for(prompt))
    }

    async fn release(&self, handle: &EngineHandle) -> Result<()> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(Error::engine_shutdown("scripted release failure"));
        }
        self.handles.release(handle).await
    }
}
