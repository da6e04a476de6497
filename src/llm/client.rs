use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::gemini::GeminiClient;
use super::openai::OpenAIClient;
use crate::session::{Part, Turn};
use crate::tool::ToolDefinition;

/// Input for an LLM request.
#[derive(Debug, Clone)]
pub struct LLMInput {
    /// The model to use
    pub model: String,
    /// The full conversation so far, oldest first
    pub turns: Vec<Turn>,
    /// The system instruction
    pub system_prompt: String,
    /// Available tools for the LLM
    pub tools: Vec<ToolDefinition>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Optional temperature (0.0 to 1.0)
    pub temperature: Option<f32>,
}

/// Output from an LLM response: the parts of one model turn.
#[derive(Debug, Clone)]
pub struct LLMOutput {
    /// The content of the response
    pub parts: Vec<Part>,
    /// The reason the response finished
    pub finish_reason: FinishReason,
    /// Token usage statistics
    pub usage: Usage,
}

/// The reason the LLM finished generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural stop point reached
    Stop,
    /// Stopped due to tool calls
    ToolCalls,
    /// Maximum tokens reached
    MaxTokens,
    /// Blocked by a safety filter
    Safety,
    /// Any other reason
    Other,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Number of input tokens
    pub input_tokens: u32,
    /// Number of output tokens
    pub output_tokens: u32,
}

/// Errors that can occur when communicating with an LLM.
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    /// The API answered with an error status
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },
    /// A network error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    /// The response from the LLM was invalid
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),
    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimitError(String),
}

impl LLMError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            LLMError::RateLimitError(_) => true,
            LLMError::ApiError { status, .. } => *status >= 500,
            LLMError::NetworkError(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            LLMError::InvalidResponse(_) | LLMError::AuthError(_) => false,
        }
    }

    /// Maps a non-success HTTP status and body to an error.
    pub(crate) fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => LLMError::AuthError(body),
            429 => LLMError::RateLimitError(body),
            code => LLMError::ApiError {
                status: code,
                message: body,
            },
        }
    }
}

/// Trait for LLM clients.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Sends a request and returns a complete response.
    async fn complete(&self, input: LLMInput) -> Result<LLMOutput, LLMError>;
}

/// A builder for creating LLM clients.
#[derive(Debug, Default)]
pub struct LLMClientBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl LLMClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Creates a Gemini client, falling back to `GEMINI_API_KEY`.
    pub fn build_gemini(self) -> Result<Arc<dyn LLMClient>, LLMError> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .ok_or(LLMError::AuthError("Gemini API key not provided".to_string()))?;
        Ok(Arc::new(GeminiClient::new(api_key, self.base_url, self.timeout)?))
    }

    /// Creates an OpenAI-compatible client, falling back to `OPENAI_API_KEY`.
    pub fn build_openai(self) -> Result<Arc<dyn LLMClient>, LLMError> {
        let api_key = self
            .api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .ok_or(LLMError::AuthError("OpenAI API key not provided".to_string()))?;
        Ok(Arc::new(OpenAIClient::new(api_key, self.base_url, self.timeout)?))
    }
}
