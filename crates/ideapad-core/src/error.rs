//! Error types for ideapad-core.

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigValidationError;

/// Result type alias using ideapad-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for conversation and engine operations
#[derive(Error, Debug)]
pub enum Error {
    // Caller errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Invalid sampling configuration: {0}")]
    Config(#[from] ConfigValidationError),

    // Engine errors
    #[error("Failed to load model {model_path}: {reason}")]
    EngineInit { model_path: String, reason: String },

    #[error("Engine inference error: {0}")]
    EngineInference(String),

    #[error("Engine returned invalid response structure: {0}")]
    InvalidResponseShape(String),

    #[error("Engine shutdown error: {0}")]
    EngineShutdown(String),

    // Session errors
    #[error("Inference failed: {0}")]
    Inference(#[source] Box<Error>),

    #[error("Session has been shut down")]
    SessionClosed,
}

/// Stable, enumerable error codes surfaced across the system boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    ConversationNotFound,
    ConfigError,
    EngineInitError,
    EngineInferenceError,
    InvalidResponseShape,
    ShutdownError,
}

impl ErrorCode {
    /// Code as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::ConversationNotFound => "CONVERSATION_NOT_FOUND",
            Self::ConfigError => "CONFIG_ERROR",
            Self::EngineInitError => "ENGINE_INIT_ERROR",
            Self::EngineInferenceError => "ENGINE_INFERENCE_ERROR",
            Self::InvalidResponseShape => "INVALID_RESPONSE_SHAPE",
            Self::ShutdownError => "SHUTDOWN_ERROR",
        }
    }

    /// Fixed human-readable message for this code.
    ///
    /// Backend detail never appears here; it is only logged.
    pub fn message(&self) -> &'static str {
        match self {
            Self::InvalidInput => "Prompt must be a non-empty string",
            Self::ConversationNotFound => "Conversation not found",
            Self::ConfigError => "Invalid sampling configuration",
            Self::EngineInitError => "Model instance failed to initialize",
            Self::EngineInferenceError => "Failed during model inference",
            Self::InvalidResponseShape => "Model returned invalid response structure.",
            Self::ShutdownError => "Failed to shutdown the model properly",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a conversation not found error
    pub fn not_found(conversation_id: impl Into<String>) -> Self {
        Self::ConversationNotFound(conversation_id.into())
    }

    /// Create an engine initialization error
    pub fn engine_init(model_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EngineInit {
            model_path: model_path.into(),
            reason: reason.into(),
        }
    }

    /// Create an engine inference error
    pub fn engine_inference(message: impl Into<String>) -> Self {
        Self::EngineInference(message.into())
    }

    /// Create an invalid response shape error
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponseShape(message.into())
    }

    /// Create an engine shutdown error
    pub fn engine_shutdown(message: impl Into<String>) -> Self {
        Self::EngineShutdown(message.into())
    }

    /// Wrap an adapter failure raised while serving a prompt
    pub fn inference(source: Error) -> Self {
        Self::Inference(Box::new(source))
    }

    /// Stable code for this error.
    ///
    /// `Inference` reports the code of the failure it wraps, except that
    /// wrapped caller errors still count as inference failures.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::ConversationNotFound(_) | Self::SessionClosed => ErrorCode::ConversationNotFound,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::EngineInit { .. } => ErrorCode::EngineInitError,
            Self::EngineInference(_) => ErrorCode::EngineInferenceError,
            Self::InvalidResponseShape(_) => ErrorCode::InvalidResponseShape,
            Self::EngineShutdown(_) => ErrorCode::ShutdownError,
            Self::Inference(inner) => match inner.code() {
                ErrorCode::InvalidResponseShape => ErrorCode::InvalidResponseShape,
                ErrorCode::EngineInitError => ErrorCode::EngineInitError,
                _ => ErrorCode::EngineInferenceError,
            },
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        self.code() == ErrorCode::ConversationNotFound
    }

    /// Check if this error was caused by caller input
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::InvalidInput | ErrorCode::ConversationNotFound | ErrorCode::ConfigError
        )
    }
}
