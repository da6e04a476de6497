use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One role-tagged entry in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Unique identifier for the turn
    pub id: String,
    /// Who produced the turn
    pub role: Role,
    /// Ordered content fragments
    pub parts: Vec<Part>,
    /// Timestamp when the turn was created
    pub created_at: DateTime<Utc>,
}

/// The producer of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person asking the question
    User,
    /// The language model
    Model,
    /// Results of tool executions
    Tool,
}

/// A content fragment within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    /// Plain text
    Text(String),
    /// A request from the model to run a tool
    FunctionCall {
        /// Provider-assigned call id, when the provider uses one
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// The tool name
        name: String,
        /// The arguments to pass to the tool
        args: Value,
    },
    /// The outcome of a tool execution
    FunctionResponse {
        /// Id of the call this answers
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        /// The tool name
        name: String,
        /// `{"data": ...}` on success, `{"error": ...}` on failure
        response: Value,
    },
}

impl Part {
    /// Creates a text part.
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    /// Creates a function call part without a provider id.
    pub fn function_call(name: impl Into<String>, args: Value) -> Self {
        Part::FunctionCall {
            id: None,
            name: name.into(),
            args,
        }
    }

    pub fn is_function_call(&self) -> bool {
        matches!(self, Part::FunctionCall { .. })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl Turn {
    fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            parts,
            created_at: Utc::now(),
        }
    }

    /// Creates a new user turn holding the question.
    pub fn new_user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// Creates a new model turn.
    pub fn new_model(parts: Vec<Part>) -> Self {
        Self::new(Role::Model, parts)
    }

    /// Creates a new tool turn. Only `FunctionResponse` parts belong here.
    pub fn new_tool(responses: Vec<Part>) -> Self {
        debug_assert!(
            responses
                .iter()
                .all(|p| matches!(p, Part::FunctionResponse { .. }))
        );
        Self::new(Role::Tool, responses)
    }

    /// Returns true if any part asks for a tool.
    pub fn has_function_calls(&self) -> bool {
        self.parts.iter().any(Part::is_function_call)
    }

    /// Concatenated text of all text parts, or `None` if there are none.
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self.parts.iter().filter_map(Part::as_text).collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }
}
