pub mod client;
pub mod gemini;
pub mod openai;

pub use client::{FinishReason, LLMClient, LLMClientBuilder, LLMError, LLMInput, LLMOutput, Usage};
pub use gemini::GeminiClient;
pub use openai::OpenAIClient;

#[cfg(test)]
pub(crate) mod scripted;
