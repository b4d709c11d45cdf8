//! Inference engine boundary.
//!
//! ```text
//! ModelSession ──► EngineAdapter ──► dyn InferenceBackend
//!                   (one handle)      load / complete / release
//! ```
//!
//! A backend may serve many handles; an adapter owns exactly one of them for
//! its whole life and gives it back through [`EngineAdapter::close`].

#[cfg(feature = "http")]
mod http;
mod stub;
#[cfg(test)]
pub(crate) mod testing;

#[cfg(feature = "http")]
pub use http::{HttpBackend, HttpBackendConfig};
pub use stub::StubBackend;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::SamplingConfig;
use crate::error::{Error, Result};

/// A model loaded by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineHandle {
    id: u64,
    model: String,
    context_size: u32,
}

impl EngineHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Model name as the backend knows it
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn context_size(&self) -> u32 {
        self.context_size
    }
}

/// Contract toward the inference engine.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short backend name (for logging and health output).
    fn name(&self) -> &str;

    /// Load a model. Fails with `EngineInit`.
    async fn load(&self, model_source: &str, context_size: u32) -> Result<EngineHandle>;

    /// Run one completion. Fails with `EngineInference` or `InvalidResponseShape`.
    async fn complete(
        &self,
        handle: &EngineHandle,
        prompt: &str,
        params: &SamplingConfig,
    ) -> Result<String>;

    /// Release a loaded model. Fails with `EngineShutdown`.
    async fn release(&self, handle: &EngineHandle) -> Result<()>;
}

/// Live handle bookkeeping shared by the bundled backends
#[derive(Debug, Default)]
pub(crate) struct HandleTable {
    next_id: AtomicU64,
    live: Mutex<HashSet<u64>>,
}

impl HandleTable {
    pub(crate) async fn acquire(&self, model: impl Into<String>, context_size: u32) -> EngineHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.live.lock().await.insert(id);
        EngineHandle {
            id,
            model: model.into(),
            context_size,
        }
    }

    pub(crate) async fn is_live(&self, handle: &EngineHandle) -> bool {
        self.live.lock().await.contains(&handle.id)
    }

    pub(crate) async fn release(&self, handle: &EngineHandle) -> Result<()> {
        if self.live.lock().await.remove(&handle.id) {
            Ok(())
        } else {
            Err(Error::engine_shutdown(format!(
                "handle {} for {} is not loaded",
                handle.id, handle.model
            )))
        }
    }

    pub(crate) async fn live_count(&self) -> usize {
        self.live.lock().await.len()
    }
}

/// Extract generated text from an OpenAI-style completion body.
///
/// Expects `{"choices": [{"text": "..."}]}`; anything else is an
/// `InvalidResponseShape`.
pub fn parse_completion(body: &serde_json::Value) -> Result<String> {
    let choices = body
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| Error::invalid_response("missing choices array"))?;

    let first = choices
        .first()
        .ok_or_else(|| Error::invalid_response("empty choices array"))?;

    let text = first
        .get("text")
        .and_then(|t| t.as_str())
        .ok_or_else(|| Error::invalid_response("choice has no text"))?;

    Ok(text.trim().to_string())
}

/// Exclusive owner of one loaded model
pub struct EngineAdapter {
    backend: Arc<dyn InferenceBackend>,
    handle: Option<EngineHandle>,
}

impl std::fmt::Debug for EngineAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineAdapter")
            .field("backend", &self.backend.name())
            .field("handle", &self.handle)
            .finish()
    }
}

impl EngineAdapter {
    /// Load the configured model.
    ///
    /// Load failures surface here rather than at the first generate call.
    pub async fn open(backend: Arc<dyn InferenceBackend>, config: &SamplingConfig) -> Result<Self> {
        let handle = backend
            .load(&config.model_path, config.n_ctx)
            .await
            .map_err(|e| match e {
                Error::EngineInit { .. } => e,
                other => Error::engine_init(&config.model_path, other.to_string()),
            })?;

        debug!(
            "Loaded {} on {} (handle {})",
            config.model_path,
            backend.name(),
            handle.id
        );

        Ok(Self {
            backend,
            handle: Some(handle),
        })
    }

    /// Whether the adapter still holds its model
    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Backend this adapter talks to
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Generate text for a non-empty prompt
    pub async fn generate(&self, prompt: &str, config: &SamplingConfig) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(Error::invalid_input("prompt must be a non-empty string"));
        }

        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| Error::engine_inference("engine has been released"))?;

        self.backend
            .complete(handle, prompt, config)
            .await
            .map_err(|e| match e {
                Error::EngineInference(_) | Error::InvalidResponseShape(_) => e,
                other => Error::engine_inference(other.to_string()),
            })
    }

    /// Release the model. A no-op when nothing is held.
    pub async fn close(&mut self) -> Result<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };

        self.backend.release(&handle).await.map_err(|e| match e {
            Error::EngineShutdown(_) => e,
            other => Error::engine_shutdown(other.to_string()),
        })
    }
}

impl Drop for EngineAdapter {
    fn drop(&mut self) {
        if let Some(ref handle) = self.handle {
            warn!(
                "Engine handle {} for {} dropped without close",
                handle.id, handle.model
            );
        }
    }
}
