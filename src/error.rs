//! Error types for the sql-agent library.

use thiserror::Error;

use crate::agent::RetryExhausted;

/// Errors that abort an agent invocation.
///
/// Tool failures never appear here; they are reported to the model as
/// function responses instead.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The model call failed permanently or ran out of retries
    #[error(transparent)]
    ModelUnavailable(#[from] RetryExhausted),

    /// The state machine was entered in an invalid state
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The model kept requesting tools past the configured cap
    #[error("Max steps exceeded ({0} model calls)")]
    MaxStepsExceeded(usize),
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;
