//! Append-only conversation history kept in the shape its provider expects.

use crate::api::{ChatMessage, GeminiContent};
use crate::core::message::{Role, Turn};

/// How a provider wants its history encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryShape {
    /// `[{role, content}]` with `assistant` replies.
    Flat,
    /// `[{role, parts: [{text}]}]` with `model` replies.
    Nested,
}

impl HistoryShape {
    pub fn assistant_role(self) -> Role {
        match self {
            HistoryShape::Flat => Role::Assistant,
            HistoryShape::Nested => Role::Model,
        }
    }
}

/// Request-ready copy of the history.
#[derive(Debug, Clone, PartialEq)]
pub enum HistorySnapshot {
    Flat(Vec<ChatMessage>),
    Nested(Vec<GeminiContent>),
}

#[derive(Debug, Clone)]
pub struct Conversation {
    shape: HistoryShape,
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(shape: HistoryShape) -> Self {
        Self {
            shape,
            turns: Vec::new(),
        }
    }

    /// Start a conversation from seed turns (system prompt, greeting).
    pub fn with_seed(shape: HistoryShape, seed: impl IntoIterator<Item = Turn>) -> Self {
        Self {
            shape,
            turns: seed.into_iter().collect(),
        }
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::new(Role::User, text));
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::new(self.shape.assistant_role(), text));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn snapshot_for_request(&self) -> HistorySnapshot {
        match self.shape {
            HistoryShape::Flat => HistorySnapshot::Flat(
                self.turns
                    .iter()
                    .map(|turn| ChatMessage {
                        role: turn.role().as_str().to_string(),
                        content: turn.content().to_string(),
                    })
                    .collect(),
            ),
            HistoryShape::Nested => HistorySnapshot::Nested(
                self.turns
                    .iter()
                    .map(|turn| GeminiContent::text(nested_role(turn.role()), turn.content()))
                    .collect(),
            ),
        }
    }
}

// Gemini only knows `user` and `model`; system text rides in a user turn.
fn nested_role(role: Role) -> &'static str {
    if role.is_assistant() {
        Role::Model.as_str()
    } else {
        Role::User.as_str()
    }
}
