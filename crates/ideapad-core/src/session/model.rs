//! A single conversation bound to a loaded model.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::ConversationHistory;
use crate::config::{SamplingConfig, SessionOptions};
use crate::engine::{EngineAdapter, InferenceBackend};
use crate::error::{Error, Result};
use crate::types::{ConversationId, ConversationSummary, SessionDetail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    WarmedUp,
    Active,
    ShutDown,
}

/// One engine instance plus the turns it has produced
#[derive(Debug)]
pub struct ModelSession {
    config: SamplingConfig,
    options: SessionOptions,
    adapter: EngineAdapter,
    history: ConversationHistory,
    state: SessionState,
    created_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl ModelSession {
    /// Load the model and warm it up.
    ///
    /// Returns either a session ready for [`respond`](Self::respond) or the
    /// failure; a model loaded before a failed warm-up is released first.
    pub async fn open(
        backend: Arc<dyn InferenceBackend>,
        config: SamplingConfig,
        options: SessionOptions,
    ) -> Result<Self> {
        let adapter = EngineAdapter::open(backend, &config).await?;
        let now = Utc::now();

        let mut session = Self {
            config,
            options,
            adapter,
            history: ConversationHistory::new(),
            state: SessionState::Created,
            created_at: now,
            last_activity_at: now,
        };

        if let Err(e) = session.warm_up().await {
            warn!("Warm-up failed for {}: {}", session.config.model_path, e);
            if let Err(close_err) = session.shutdown().await {
                warn!(
                    "Releasing {} after failed warm-up also failed: {}",
                    session.config.model_path, close_err
                );
            }
            return Err(e);
        }

        info!(
            "Session ready on {} ({})",
            session.config.model_path,
            session.adapter.backend_name()
        );
        Ok(session)
    }

    async fn warm_up(&mut self) -> Result<()> {
        let prompt = self.options.warm_up_prompt.clone();
        self.generate(&prompt).await?;
        self.state = SessionState::WarmedUp;
        Ok(())
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let limit = self.options.generate_timeout;
        match tokio::time::timeout(limit, self.adapter.generate(prompt, &self.config)).await {
            Ok(result) => result,
            Err(_) => Err(Error::engine_inference(format!(
                "generate timed out after {}ms",
                limit.as_millis()
            ))),
        }
    }

    /// Answer a prompt in the context of the conversation so far.
    pub async fn respond(&mut self, prompt: &str) -> Result<String> {
        match self.state {
            SessionState::WarmedUp | SessionState::Active => {}
            SessionState::ShutDown => return Err(Error::SessionClosed),
            SessionState::Created => {
                return Err(Error::engine_inference("session has not been warmed up"));
            }
        }

        if prompt.trim().is_empty() {
            return Err(Error::invalid_input("prompt must be a non-empty string"));
        }

        let budget = self.config.n_ctx.saturating_sub(self.config.max_tokens) as usize;
        let rendered = self.history.render_prompt(prompt, budget);

        let reply = self.generate(&rendered).await.map_err(Error::inference)?;
        debug!(
            "Generated {} chars on {} ({} turns before)",
            reply.len(),
            self.config.model_path,
            self.history.len()
        );

        self.history.record_exchange(prompt, reply.clone());
        self.state = SessionState::Active;
        self.last_activity_at = Utc::now();
        Ok(reply)
    }

    /// Release the engine. Safe to call more than once.
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.state == SessionState::ShutDown {
            return Ok(());
        }
        self.state = SessionState::ShutDown;
        self.adapter.close().await
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    pub fn model_path(&self) -> &str {
        &self.config.model_path
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    /// Number of recorded turns
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    pub fn summary(&self, conversation_id: ConversationId) -> ConversationSummary {
        ConversationSummary::idle(
            conversation_id,
            SessionDetail {
                model_path: self.config.model_path.clone(),
                turns: self.history.len(),
                created_at: self.created_at,
                last_activity_at: self.last_activity_at,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::ScriptedBackend;
    use std::time::Duration;

    async fn open_session(backend: &Arc<ScriptedBackend>, model: &str) -> Result<ModelSession> {
        ModelSession::open(
            backend.clone(),
            SamplingConfig::new(model),
            SessionOptions::default(),
        )
        .await
    }

    #[tokio::test]
    async fn test_open_warms_up() {
        let backend = Arc::new(ScriptedBackend::new());
        let session = open_session(&backend, "m1").await.unwrap();

        assert_eq!(session.state(), SessionState::WarmedUp);
        assert_eq!(backend.completions(), 1);
        assert_eq!(backend.last_prompt().as_deref(), Some("Warm up"));
        // Warm-up output is not part of the conversation
        assert_eq!(session.history_len(), 0);

        let mut session = session;
        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_open_missing_model() {
        let backend = Arc::new(ScriptedBackend::new());
        let err = open_session(&backend, "missing.gguf").await.unwrap_err();

        assert!(matches!(err, Error::EngineInit { .. }));
        assert_eq!(backend.completions(), 0);
    }

    #[tokio::test]
    async fn test_failed_warm_up_releases_engine() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.fail_completions(true);

        let err = open_session(&backend, "m1").await.unwrap_err();
        assert!(matches!(err, Error::EngineInference(_)));
        assert_eq!(backend.releases(), 1);
        assert_eq!(backend.live_handles().await, 0);
    }

    #[tokio::test]
    async fn test_warm_up_timeout() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.delay_completions(Duration::from_millis(200));

        let options = SessionOptions {
            generate_timeout: Duration::from_millis(20),
            ..Default::default()
        };
        let err = ModelSession::open(backend.clone(), SamplingConfig::new("m1"), options)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::EngineInference(_)));
        assert!(err.to_string().contains("timed out"));
        assert_eq!(backend.live_handles().await, 0);
    }

    #[tokio::test]
    async fn test_respond_records_pair() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut session = open_session(&backend, "m1").await.unwrap();

        let reply = session.respond("hello").await.unwrap();
        assert_eq!(reply, "Response to: hello");
        assert_eq!(session.history_len(), 2);
        assert_eq!(session.state(), SessionState::Active);

        session.respond("and again").await.unwrap();
        assert_eq!(session.history_len(), 4);

        // The engine saw the earlier exchange as context
        let prompt = backend.last_prompt().unwrap();
        assert!(prompt.starts_with("User: hello\nAssistant: Response to: hello\n"));
        assert!(prompt.ends_with("User: and again\nAssistant:"));

        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_respond_empty_prompt() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut session = open_session(&backend, "m1").await.unwrap();
        session.respond("hello").await.unwrap();

        let err = session.respond("  ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(session.history_len(), 2);

        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_respond_leaves_no_orphan_turn() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut session = open_session(&backend, "m1").await.unwrap();
        session.respond("hello").await.unwrap();

        backend.fail_completions(true);
        let err = session.respond("this will fail").await.unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
        assert_eq!(err.code(), crate::ErrorCode::EngineInferenceError);
        assert_eq!(session.history_len(), 2);

        backend.fail_completions(false);
        backend.malformed_responses(true);
        let err = session.respond("bad shape").await.unwrap_err();
        assert_eq!(err.code(), crate::ErrorCode::InvalidResponseShape);
        assert_eq!(session.history_len() % 2, 0);

        // Session is still usable afterwards
        backend.malformed_responses(false);
        session.respond("recovered").await.unwrap();
        assert_eq!(session.history_len(), 4);

        session.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_twice_is_noop() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut session = open_session(&backend, "m1").await.unwrap();

        session.shutdown().await.unwrap();
        session.shutdown().await.unwrap();
        assert_eq!(session.state(), SessionState::ShutDown);
        assert_eq!(backend.releases(), 1);

        let err = session.respond("hello").await.unwrap_err();
        assert!(matches!(err, Error::SessionClosed));
    }

    #[tokio::test]
    async fn test_shutdown_error_still_closes() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut session = open_session(&backend, "m1").await.unwrap();

        backend.fail_releases(true);
        let err = session.shutdown().await.unwrap_err();
        assert!(matches!(err, Error::EngineShutdown(_)));
        assert_eq!(session.state(), SessionState::ShutDown);

        // The failure is reported once; later calls do nothing
        session.shutdown().await.unwrap();
        assert_eq!(backend.releases(), 1);
    }

    #[tokio::test]
    async fn test_summary() {
        let backend = Arc::new(ScriptedBackend::new());
        let mut session = open_session(&backend, "m1").await.unwrap();
        session.respond("hello").await.unwrap();

        let id = ConversationId::new();
        let summary = session.summary(id);
        assert_eq!(summary.conversation_id, id);
        assert!(!summary.busy);
        let detail = summary.detail.unwrap();
        assert_eq!(detail.model_path, "m1");
        assert_eq!(detail.turns, 2);
        assert!(detail.last_activity_at >= detail.created_at);

        session.shutdown().await.unwrap();
    }
}
