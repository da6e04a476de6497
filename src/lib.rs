//! # SQL Agent
//!
//! A natural-language chat agent over a SQLite database of customer records.
//!
//! ## Features
//!
//! - **Agent Loop**: Model/tool state machine that runs until the model answers in text
//! - **SQL Tools**: `list_tables`, `describe_table` and `run_query` over a [`store::DataStore`]
//! - **Model Backends**: Gemini `generateContent` and OpenAI-compatible chat completions
//! - **Retries**: Exponential backoff on transient model failures
//! - **Web Page**: A small chat page with in-memory history
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sql_agent::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let llm_client = LLMClientBuilder::new()
//!         .with_api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build_gemini()?;
//!
//!     let store = Arc::new(SqliteStore::new("customers.db"));
//!     let agent = Agent::with_defaults(llm_client, ToolRegistry::new(store));
//!
//!     let answer = agent.invoke("How many customers are married?").await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod session;
pub mod store;
pub mod tool;
pub mod web;

// Re-exports for convenient usage
pub use agent::{Agent, AgentConfig, LoopState, RetryPolicy};
pub use config::{AppConfig, ConfigError, Provider};
pub use error::{AgentError, Result};
pub use llm::{GeminiClient, LLMClient, LLMClientBuilder, LLMError, LLMInput, LLMOutput, OpenAIClient};
pub use session::{Conversation, Part, Role, Turn};
pub use store::{DataStore, QueryOutcome, SqliteStore, StoreError};
pub use tool::{ToolDefinition, ToolError, ToolExecutor, ToolRegistry, ToolResult};

/// Prelude module with commonly used types.
pub mod prelude {
    pub use crate::agent::{Agent, AgentConfig};
    pub use crate::llm::{LLMClient, LLMClientBuilder};
    pub use crate::store::{DataStore, SqliteStore};
    pub use crate::tool::ToolRegistry;
    pub use std::sync::Arc;
}
