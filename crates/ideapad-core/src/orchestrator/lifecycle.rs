//! The four conversation operations plus housekeeping sweeps.

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigValidationError, SamplingConfig, SessionOptions};
use crate::engine::InferenceBackend;
use crate::error::{Error, Result};
use crate::registry::{SessionRegistry, SharedSession};
use crate::session::ModelSession;
use crate::types::{ConversationId, ConversationSummary};

/// Outcome of a sweep over several conversations
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sweep {
    /// Conversations removed from the registry
    pub ended: Vec<ConversationId>,
    /// How many of those failed to release their engine
    pub release_failures: usize,
}

/// Lifecycle manager over an injected registry and backend.
///
/// Every transition that removes an entry or loads a model runs on its own
/// tokio task. Dropping the caller's future (a client disconnecting, a
/// timeout around the call) therefore never strands a loaded engine.
pub struct SessionOrchestrator {
    inner: Lifecycle,
}

impl SessionOrchestrator {
    /// Create a new orchestrator
    pub fn new(
        registry: Arc<SessionRegistry>,
        backend: Arc<dyn InferenceBackend>,
        options: SessionOptions,
    ) -> Self {
        Self {
            inner: Lifecycle {
                registry,
                backend,
                options,
            },
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.inner.registry
    }

    pub fn backend_name(&self) -> &str {
        self.inner.backend.name()
    }

    /// Number of live conversations
    pub async fn active_conversations(&self) -> usize {
        self.inner.registry.len().await
    }

    /// Start a conversation.
    ///
    /// Nothing is registered unless the session loaded and warmed up.
    pub async fn start(&self, config: SamplingConfig) -> Result<ConversationId> {
        let lifecycle = self.inner.clone();
        self.issue(async move { lifecycle.start(config).await }).await
    }

    /// Send a prompt to a conversation and return the reply
    pub async fn continue_conversation(&self, id: &ConversationId, prompt: &str) -> Result<String> {
        let shared = self.inner.registry.lookup_or_fail(id).await?;
        let mut session = shared.lock().await;

        session.respond(prompt).await.map_err(|e| match e {
            // Ended while this call waited for the session
            Error::SessionClosed => Error::not_found(id.to_string()),
            other => {
                if !other.is_caller_error() {
                    error!("Conversation {} failed to respond: {}", id, other);
                }
                other
            }
        })
    }

    /// End a conversation.
    ///
    /// The entry is gone even when releasing the engine fails; the release
    /// error is still returned.
    pub async fn end(&self, id: &ConversationId) -> Result<()> {
        let lifecycle = self.inner.clone();
        let id = *id;
        detach(async move { lifecycle.end(&id).await })
            .await
            .unwrap_or_else(|| Err(cancelled()))
    }

    /// Replace a conversation's model, returning the new identifier.
    pub async fn change_model(&self, id: &ConversationId, model_path: &str) -> Result<ConversationId> {
        if model_path.trim().is_empty() {
            return Err(ConfigValidationError::MissingModelPath.into());
        }

        let lifecycle = self.inner.clone();
        let id = *id;
        let model_path = model_path.to_string();
        self.issue(async move { lifecycle.change_model(&id, &model_path).await })
            .await
    }

    /// Answer one prompt on a throwaway session that is never registered
    pub async fn one_shot(&self, config: SamplingConfig, prompt: &str) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(Error::invalid_input("prompt must be a non-empty string"));
        }

        let lifecycle = self.inner.clone();
        let prompt = prompt.to_string();
        detach(async move { lifecycle.one_shot(config, &prompt).await })
            .await
            .unwrap_or_else(|| Err(cancelled()))
    }

    /// Summaries of every live conversation, oldest first.
    ///
    /// A session in the middle of a call is reported as busy instead of
    /// waited on, so listing never blocks behind a slow generate.
    pub async fn list(&self) -> Vec<ConversationSummary> {
        let mut summaries: Vec<_> = self
            .inner
            .registry
            .snapshot()
            .await
            .into_iter()
            .map(|(id, shared)| match shared.try_lock() {
                Ok(session) => session.summary(id),
                Err(_) => ConversationSummary::busy(id),
            })
            .collect();
        summaries.sort_by_key(|s| (s.busy, s.detail.as_ref().map(|d| d.created_at)));
        summaries
    }

    /// End conversations idle for at least `max_idle`.
    ///
    /// Sessions busy with a call are skipped this round.
    pub async fn reap_idle(&self, max_idle: Duration) -> Sweep {
        let lifecycle = self.inner.clone();
        detach(async move { lifecycle.reap_idle(max_idle).await })
            .await
            .unwrap_or_default()
    }

    /// Shut down every remaining session
    pub async fn shutdown_all(&self) -> Sweep {
        let lifecycle = self.inner.clone();
        detach(async move { lifecycle.shutdown_all().await })
            .await
            .unwrap_or_default()
    }

    /// Run an identifier-producing transition to completion. When the caller
    /// is gone by the time it finishes, the new conversation is ended again
    /// instead of being left without an owner.
    async fn issue<F>(&self, transition: F) -> Result<ConversationId>
    where
        F: Future<Output = Result<ConversationId>> + Send + 'static,
    {
        let lifecycle = self.inner.clone();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let result = transition.await;
            if let Err(Ok(id)) = tx.send(result) {
                warn!("Caller left before receiving conversation {}, ending it", id);
                if let Err(e) = lifecycle.end(&id).await {
                    debug!("Ending abandoned conversation {}: {}", id, e);
                }
            }
        });

        rx.await.unwrap_or_else(|_| Err(cancelled()))
    }
}

/// Drive `task` on its own tokio task so it completes even if the awaiting
/// future is dropped. A panic inside the task is re-raised here.
async fn detach<T>(task: impl Future<Output = T> + Send + 'static) -> Option<T>
where
    T: Send + 'static,
{
    match tokio::spawn(task).await {
        Ok(value) => Some(value),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            warn!("Lifecycle task did not complete: {}", e);
            None
        }
    }
}

fn cancelled() -> Error {
    Error::engine_inference("lifecycle task stopped before completing")
}

/// State shared by the detached lifecycle tasks
#[derive(Clone)]
struct Lifecycle {
    registry: Arc<SessionRegistry>,
    backend: Arc<dyn InferenceBackend>,
    options: SessionOptions,
}

impl Lifecycle {
    async fn start(&self, config: SamplingConfig) -> Result<ConversationId> {
        config.validate()?;

        let model_path = config.model_path.clone();
        let session = self.open_session(config).await?;
        let id = self.register(session).await;

        info!("Started conversation {} on {}", id, model_path);
        Ok(id)
    }

    async fn end(&self, id: &ConversationId) -> Result<()> {
        let shared = self.registry.remove_or_fail(id).await?;
        self.release(id, shared).await?;

        info!("Ended conversation {}", id);
        Ok(())
    }

    async fn change_model(&self, id: &ConversationId, model_path: &str) -> Result<ConversationId> {
        let shared = self.registry.remove_or_fail(id).await?;
        let config = {
            let mut session = shared.lock().await;
            let config = session.config().with_model(model_path);
            if let Err(e) = session.shutdown().await {
                warn!("Releasing conversation {} during model change failed: {}", id, e);
            }
            config
        };

        let session = self.open_session(config).await.inspect_err(|e| {
            warn!(
                "Conversation {} ended but replacement on {} failed: {}",
                id, model_path, e
            );
        })?;
        let new_id = self.register(session).await;

        info!("Conversation {} moved to {} as {}", id, model_path, new_id);
        Ok(new_id)
    }

    async fn one_shot(&self, config: SamplingConfig, prompt: &str) -> Result<String> {
        config.validate()?;

        let mut session = self.open_session(config).await?;
        let reply = session.respond(prompt).await;
        let closed = session.shutdown().await;

        match (reply, closed) {
            (Ok(reply), Ok(())) => Ok(reply),
            (Ok(reply), Err(e)) => {
                warn!("Releasing one-shot session on {} failed: {}", session.model_path(), e);
                Ok(reply)
            }
            (Err(e), _) => {
                if !e.is_caller_error() {
                    error!("One-shot prompt on {} failed: {}", session.model_path(), e);
                }
                Err(e)
            }
        }
    }

    async fn reap_idle(&self, max_idle: Duration) -> Sweep {
        let mut sweep = Sweep::default();

        for (id, shared) in self.registry.snapshot().await {
            // The guard is held from the idle check through shutdown, so no
            // call can land on the session in between
            let Ok(mut session) = shared.try_lock() else {
                continue;
            };
            let idle_for = (Utc::now() - session.last_activity_at())
                .to_std()
                .unwrap_or_default();
            if idle_for < max_idle {
                continue;
            }

            // Someone else may have ended it since the snapshot
            if self.registry.remove_or_fail(&id).await.is_err() {
                continue;
            }
            if let Err(e) = session.shutdown().await {
                warn!("Releasing idle conversation {} failed: {}", id, e);
                sweep.release_failures += 1;
            }
            info!("Reaped idle conversation {} after {}s", id, idle_for.as_secs());
            sweep.ended.push(id);
        }

        if sweep.release_failures > 0 {
            warn!(
                "Reaped {} idle conversation(s), {} failed to release",
                sweep.ended.len(),
                sweep.release_failures
            );
        }
        sweep
    }

    async fn shutdown_all(&self) -> Sweep {
        let mut sweep = Sweep::default();

        for (id, shared) in self.registry.drain().await {
            if self.release(&id, shared).await.is_err() {
                sweep.release_failures += 1;
            }
            sweep.ended.push(id);
        }

        if !sweep.ended.is_empty() {
            info!(
                "Shut down {} remaining conversation(s), {} release failure(s)",
                sweep.ended.len(),
                sweep.release_failures
            );
        }
        sweep
    }

    async fn open_session(&self, config: SamplingConfig) -> Result<ModelSession> {
        ModelSession::open(Arc::clone(&self.backend), config, self.options.clone())
            .await
            .inspect_err(|e| error!("Failed to open session: {}", e))
    }

    async fn register(&self, mut session: ModelSession) -> ConversationId {
        loop {
            let id = ConversationId::new();
            match self.registry.insert(id, session).await {
                Ok(_) => return id,
                Err(returned) => {
                    debug!("Conversation id {} already taken, drawing another", id);
                    session = returned;
                }
            }
        }
    }

    /// Shut down a session that is no longer reachable from the registry
    async fn release(&self, id: &ConversationId, shared: SharedSession) -> Result<()> {
        let mut session = shared.lock().await;
        session
            .shutdown()
            .await
            .inspect_err(|e| warn!("Releasing conversation {} failed: {}", id, e))
    }
}
