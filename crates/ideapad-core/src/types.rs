//! Shared types for ideapad-core.
//!
//! These types cross the core boundary and are serialized by the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque handle for one conversation, issued by `start` and `change_model`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(Uuid);

impl ConversationId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse caller-supplied text.
    ///
    /// Text that is not an identifier can never have been issued, so it is
    /// reported the same way as an unknown conversation.
    pub fn parse(value: &str) -> crate::Result<Self> {
        value
            .trim()
            .parse()
            .map_err(|_| crate::Error::not_found(value))
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConversationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Read-only view of a live conversation.
///
/// `detail` is absent while the session is busy with a call.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub conversation_id: ConversationId,
    pub busy: bool,
    #[serde(flatten)]
    pub detail: Option<SessionDetail>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub model_path: String,
    pub turns: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl ConversationSummary {
    pub fn idle(conversation_id: ConversationId, detail: SessionDetail) -> Self {
        Self {
            conversation_id,
            busy: false,
            detail: Some(detail),
        }
    }

    /// A conversation whose session is locked by an in-flight call
    pub fn busy(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            busy: true,
            detail: None,
        }
    }
}
