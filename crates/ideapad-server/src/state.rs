//! Application state.

use ideapad_core::{
    InferenceBackend, SamplingConfig, SessionOrchestrator, SessionRegistry,
};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Conversation lifecycle manager
    pub orchestrator: Arc<SessionOrchestrator>,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state with a fresh registry
    pub fn new(config: Config, backend: Arc<dyn InferenceBackend>) -> Arc<Self> {
        let orchestrator = SessionOrchestrator::new(
            Arc::new(SessionRegistry::new()),
            backend,
            config.session.options(),
        );

        Arc::new(Self {
            config: Arc::new(config),
            orchestrator: Arc::new(orchestrator),
            start_time: Instant::now(),
        })
    }

    /// Sampling configuration new conversations start from
    pub fn default_sampling(&self) -> &SamplingConfig {
        &self.config.sampling
    }
}
