pub mod agent_loop;
pub mod prompt;
pub mod retry;

pub use agent_loop::{final_answer, Agent, AgentConfig, LoopState, NO_RESPONSE};
pub use prompt::system_instruction;
pub use retry::{RetryExhausted, RetryPolicy};
