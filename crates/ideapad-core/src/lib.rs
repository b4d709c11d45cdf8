//! ideapad-core - Conversation session lifecycle over an LLM inference engine
//!
//! This crate provides everything the ideapad server needs below its HTTP
//! surface:
//!
//! - **engine**: Inference backend contract, adapters and backends
//! - **session**: One loaded model plus its conversation history
//! - **registry**: Concurrency-safe table of live conversations
//! - **orchestrator**: start / continue / end / change_model
//! - **config**: Sampling parameters and session options
//! - **error**: Error taxonomy with stable codes

pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use config::{ConfigValidationError, SamplingConfig, SamplingOverrides, SessionOptions};
#[cfg(feature = "http")]
pub use engine::{HttpBackend, HttpBackendConfig};
pub use engine::{InferenceBackend, StubBackend};
pub use error::{Error, ErrorCode, Result};
pub use orchestrator::{SessionOrchestrator, Sweep};
pub use registry::{SessionRegistry, SharedSession};
pub use session::{ModelSession, SessionState};
pub use types::{ConversationId, ConversationSummary, SessionDetail};
