use serde::Serialize;
use uuid::Uuid;

use super::{Part, Turn};

/// The ordered, append-only turn log of a single invocation.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    /// Unique identifier for the conversation
    pub id: String,
    turns: Vec<Turn>,
}

impl Conversation {
    /// Starts a conversation with the user's question.
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            turns: vec![Turn::new_user(user_query)],
        }
    }

    /// Appends a turn. Turns are never reordered or removed.
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Returns the number of turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Function call parts of the last turn, in request order.
    pub fn pending_calls(&self) -> Vec<&Part> {
        self.last()
            .map(|turn| turn.parts.iter().filter(|p| p.is_function_call()).collect())
            .unwrap_or_default()
    }
}
