//! Conversation history and prompt rendering.

use serde::Serialize;

/// Transcript label for caller turns
pub const USER_LABEL: &str = "User";
/// Transcript label for model turns
pub const ASSISTANT_LABEL: &str = "Assistant";

/// Rough characters-per-token ratio used to budget the transcript
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn label(&self) -> &'static str {
        match self {
            Self::User => USER_LABEL,
            Self::Assistant => ASSISTANT_LABEL,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    fn render(&self) -> String {
        format!("{}: {}\n", self.role.label(), self.content)
    }
}

/// Append-only record of completed exchanges.
///
/// Turns are only ever added in user/assistant pairs, so the length is
/// always even.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Record one completed exchange
    pub fn record_exchange(&mut self, prompt: impl Into<String>, reply: impl Into<String>) {
        self.turns.push(Turn {
            role: Role::User,
            content: prompt.into(),
        });
        self.turns.push(Turn {
            role: Role::Assistant,
            content: reply.into(),
        });
    }

    /// Render the transcript plus a new prompt, ending with the assistant cue.
    ///
    /// Oldest exchanges are dropped first when the transcript would exceed
    /// `token_budget`; the new prompt is always kept.
    pub fn render_prompt(&self, prompt: &str, token_budget: usize) -> String {
        let tail = format!("{}: {}\n{}:", USER_LABEL, prompt, ASSISTANT_LABEL);
        let mut remaining = (token_budget * CHARS_PER_TOKEN).saturating_sub(tail.len());

        let mut kept: Vec<String> = Vec::new();
        for pair in self.turns.rchunks(2) {
            let rendered: String = pair.iter().map(Turn::render).collect();
            if rendered.len() > remaining {
                break;
            }
            remaining -= rendered.len();
            kept.push(rendered);
        }

        let mut out: String = kept.into_iter().rev().collect();
        out.push_str(&tail);
        out
    }
}
