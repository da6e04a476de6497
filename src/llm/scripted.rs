use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{FinishReason, LLMClient, LLMError, LLMInput, LLMOutput, Usage};
use crate::session::Part;

/// Replays canned responses and records every request.
pub(crate) struct ScriptedClient {
    responses: Mutex<VecDeque<Result<LLMOutput, LLMError>>>,
    requests: Mutex<Vec<LLMInput>>,
}

impl ScriptedClient {
    pub(crate) fn new(responses: Vec<Result<LLMOutput, LLMError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<LLMInput> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LLMClient for ScriptedClient {
    async fn complete(&self, input: LLMInput) -> Result<LLMOutput, LLMError> {
        self.requests.lock().unwrap().push(input);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LLMError::InvalidResponse("script exhausted".into())))
    }
}

pub(crate) fn reply(parts: Vec<Part>) -> Result<LLMOutput, LLMError> {
    Ok(LLMOutput {
        parts,
        finish_reason: FinishReason::Stop,
        usage: Usage::default(),
    })
}
