//! Offline backend for local development.
//!
//! Loads nothing into memory: a "model" is any file that exists on disk, and
//! every completion answers `Response to: <latest user prompt>`.

use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use super::{EngineHandle, HandleTable, InferenceBackend};
use crate::config::SamplingConfig;
use crate::error::{Error, Result};
use crate::session::USER_LABEL;

/// Development backend that echoes prompts back
#[derive(Debug, Default)]
pub struct StubBackend {
    handles: HandleTable,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of models currently loaded
    pub async fn live_handles(&self) -> usize {
        self.handles.live_count().await
    }
}

/// Deterministic reply for a rendered prompt
pub(crate) fn reply_for(prompt: &str) -> String {
    let latest = prompt
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(USER_LABEL))
        .map(|rest| rest.trim_start_matches(':').trim())
        .unwrap_or_else(|| prompt.trim());
    format!("Response to: {}", latest)
}

#[async_trait]
impl InferenceBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    async fn load(&self, model_source: &str, context_size: u32) -> Result<EngineHandle> {
        if !Path::new(model_source).is_file() {
            return Err(Error::engine_init(model_source, "model file not found"));
        }
        debug!("Stub backend loaded {}", model_source);
        Ok(self.handles.acquire(model_source, context_size).await)
    }

    async fn complete(
        &self,
        handle: &EngineHandle,
        prompt: &str,
        _params: &SamplingConfig,
    ) -> Result<String> {
        if !self.handles.is_live(handle).await {
            return Err(Error::engine_inference(format!(
                "handle {} is not loaded",
                handle.id()
            )));
        }
        Ok(reply_for(prompt))
    }

    async fn release(&self, handle: &EngineHandle) -> Result<()> {
        self.handles.release(handle).await
    }
}
