//! Model sessions: one loaded engine plus the conversation it has served.
//!
//! ## Lifecycle
//!
//! ```text
//! ModelSession::open
//!   │
//!   ├─► Load model through the adapter        (EngineInit on failure)
//!   │
//!   ├─► Warm-up completion, output discarded  (release + error on failure)
//!   │
//!   └─► WarmedUp
//!
//! respond(prompt)
//!   │
//!   ├─► Render history + prompt into a transcript
//!   │
//!   ├─► Generate (bounded wait)
//!   │
//!   └─► Record user + assistant turns together, only on success
//!
//! shutdown()
//!   │
//!   └─► ShutDown, adapter released (second call is a no-op)
//! ```

mod history;
mod model;

pub use history::{ASSISTANT_LABEL, ConversationHistory, Role, Turn, USER_LABEL};
pub use model::{ModelSession, SessionState};
