use std::sync::Arc;
use tracing::{debug, info};

use super::prompt::system_instruction;
use super::retry::RetryPolicy;
use crate::error::AgentError;
use crate::llm::{LLMClient, LLMInput};
use crate::session::{Conversation, Turn};
use crate::tool::{ToolExecutor, ToolRegistry};

/// Returned when the final model turn carries no text.
pub const NO_RESPONSE: &str = "No response generated.";

/// Configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// The model to use
    pub model: String,
    /// The system prompt
    pub system_prompt: String,
    /// Maximum number of model calls per invocation; `None` for no cap
    pub max_steps: Option<usize>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Optional temperature
    pub temperature: Option<f32>,
    /// Backoff for transient model failures
    pub retry: RetryPolicy,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash-exp".to_string(),
            system_prompt: system_instruction(),
            max_steps: Some(10),
            max_tokens: 4096,
            temperature: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// States of the tool-calling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Send the conversation to the model
    CallModel,
    /// Run the function calls in the last turn
    UseTool,
    /// The last turn is the answer
    Done,
}

/// The agent that answers questions by calling database tools.
///
/// Holds no per-conversation state, so one agent can serve concurrent
/// invocations.
#[derive(Clone)]
pub struct Agent {
    llm_client: Arc<dyn LLMClient>,
    tool_executor: Arc<ToolExecutor>,
    config: AgentConfig,
}

impl Agent {
    /// Creates a new agent.
    pub fn new(llm_client: Arc<dyn LLMClient>, registry: ToolRegistry, config: AgentConfig) -> Self {
        Self {
            llm_client,
            tool_executor: Arc::new(ToolExecutor::new(registry)),
            config,
        }
    }

    /// Creates a new agent with default configuration.
    pub fn with_defaults(llm_client: Arc<dyn LLMClient>, registry: ToolRegistry) -> Self {
        Self::new(llm_client, registry, AgentConfig::default())
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Answers a question and returns the model's final text.
    pub async fn invoke(&self, user_query: &str) -> Result<String, AgentError> {
        let conversation = self.run(user_query).await?;
        Ok(final_answer(&conversation))
    }

    /// Runs the loop to completion and returns the whole conversation.
    pub async fn run(&self, user_query: &str) -> Result<Conversation, AgentError> {
        let mut conversation = Conversation::new(user_query);
        let mut state = LoopState::CallModel;
        let mut steps = 0;

        info!(conversation = %conversation.id, "Agent invocation started");

        loop {
            state = match state {
                LoopState::CallModel => {
                    let max_steps = self.config.max_steps;
                    if let Some(max) = max_steps.filter(|max| steps >= *max) {
                        return Err(AgentError::MaxStepsExceeded(max));
                    }
                    steps += 1;
                    debug!(step = steps, "Calling LLM");
                    let next = self.call_model(&mut conversation).await?;
                    // Tool results from the last allowed call could never reach the model.
                    if let Some(max) = max_steps.filter(|max| next == LoopState::UseTool && steps >= *max) {
                        return Err(AgentError::MaxStepsExceeded(max));
                    }
                    next
                }
                LoopState::UseTool => self.use_tool(&mut conversation).await?,
                LoopState::Done => break,
            };
        }

        info!(
            conversation = %conversation.id,
            steps,
            turns = conversation.len(),
            "Agent invocation finished"
        );
        Ok(conversation)
    }

    /// Sends the conversation to the model and appends its turn.
    async fn call_model(&self, conversation: &mut Conversation) -> Result<LoopState, AgentError> {
        let input = LLMInput {
            model: self.config.model.clone(),
            turns: conversation.turns().to_vec(),
            system_prompt: self.config.system_prompt.clone(),
            tools: self.tool_executor.get_tool_definitions(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let output = self
            .config
            .retry
            .run(|| self.llm_client.complete(input.clone()))
            .await?;
        debug!(
            finish_reason = ?output.finish_reason,
            input_tokens = output.usage.input_tokens,
            output_tokens = output.usage.output_tokens,
            "LLM responded"
        );

        let turn = Turn::new_model(output.parts);
        let next = if turn.has_function_calls() {
            LoopState::UseTool
        } else {
            LoopState::Done
        };
        conversation.push(turn);
        Ok(next)
    }

    /// Runs every function call in the last turn and appends one tool turn.
    async fn use_tool(&self, conversation: &mut Conversation) -> Result<LoopState, AgentError> {
        let calls = conversation.pending_calls();
        if calls.is_empty() {
            return Err(AgentError::InvariantViolation(
                "tool step entered without a pending function call".to_string(),
            ));
        }

        debug!(count = calls.len(), "Executing tool calls");
        let results = self.tool_executor.execute_all(calls).await;

        conversation.push(Turn::new_tool(results));
        Ok(LoopState::CallModel)
    }
}

/// Extracts the answer from the last turn.
pub fn final_answer(conversation: &Conversation) -> String {
    conversation
        .last()
        .and_then(Turn::text)
        .unwrap_or_else(|| NO_RESPONSE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::{reply, ScriptedClient};
    use crate::llm::LLMError;
    use crate::session::{Part, Role};
    use crate::store::{Cell, MockDataStore, QueryOutcome};
    use serde_json::{json, Value};

    fn config() -> AgentConfig {
        AgentConfig {
            retry: RetryPolicy::none(),
            ..AgentConfig::default()
        }
    }

    fn agent(client: Arc<ScriptedClient>, store: MockDataStore) -> Agent {
        Agent::new(client, ToolRegistry::new(Arc::new(store)), config())
    }

    fn responses(turn: &Turn) -> Vec<(String, Value)> {
        turn.parts
            .iter()
            .map(|p| match p {
                Part::FunctionResponse { name, response, .. } => (name.clone(), response.clone()),
                other => panic!("tool turn holds {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_text_reply_finishes_without_tools() {
        let client = ScriptedClient::new(vec![reply(vec![Part::text("Hello! Ask me about customers.")])]);
        // No expectations: any store call would panic.
        let agent = agent(client.clone(), MockDataStore::new());

        let conversation = agent.run("hi").await.unwrap();
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.turns()[1].role, Role::Model);
        assert_eq!(final_answer(&conversation), "Hello! Ask me about customers.");
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_request_carries_instruction_tools_and_history() {
        let client = ScriptedClient::new(vec![
            reply(vec![Part::function_call("list_tables", json!({}))]),
            reply(vec![Part::text("customers")]),
        ]);
        let mut store = MockDataStore::new();
        store
            .expect_list_tables()
            .returning(|| Ok(vec!["customers".to_string()]));

        agent(client.clone(), store).invoke("List the tables").await.unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].system_prompt.contains("is_married INTEGER"));
        assert_eq!(requests[0].tools.len(), 3);
        assert_eq!(requests[0].turns.len(), 1);
        let roles: Vec<Role> = requests[1].turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Model, Role::Tool]);
    }

    #[tokio::test]
    async fn test_n_calls_yield_n_responses_in_order() {
        let client = ScriptedClient::new(vec![
            reply(vec![
                Part::function_call("run_query", json!({"query": "SELECT 1 AS a"})),
                Part::function_call("list_tables", json!({})),
                Part::function_call("run_query", json!({"query": "SELECT 2 AS a"})),
            ]),
            reply(vec![Part::text("done")]),
        ]);
        let mut store = MockDataStore::new();
        store.expect_run_query().times(2).returning(|sql| {
            let value = if sql.contains('1') { 1 } else { 2 };
            Ok(QueryOutcome::Rows(vec![
                [("a".to_string(), Cell::Integer(value))].into_iter().collect(),
            ]))
        });
        store
            .expect_list_tables()
            .times(1)
            .returning(|| Ok(vec!["customers".to_string()]));

        let conversation = agent(client, store).run("q").await.unwrap();

        let tool_turn = &conversation.turns()[2];
        assert_eq!(tool_turn.role, Role::Tool);
        assert_eq!(
            responses(tool_turn),
            vec![
                ("run_query".to_string(), json!({"data": [{"a": 1}]})),
                ("list_tables".to_string(), json!({"data": {"tables": ["customers"]}})),
                ("run_query".to_string(), json!({"data": [{"a": 2}]})),
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_failures_are_fed_back_to_the_model() {
        let client = ScriptedClient::new(vec![
            reply(vec![
                Part::function_call("nonexistent_tool", json!({})),
                Part::function_call("describe_table", json!({})),
            ]),
            reply(vec![Part::text("Sorry, I could not find that.")]),
        ]);

        let conversation = agent(client, MockDataStore::new()).run("q").await.unwrap();

        let results = responses(&conversation.turns()[2]);
        assert_eq!(results[0].1, json!({"error": "Unknown tool: nonexistent_tool"}));
        let message = results[1].1["error"].as_str().unwrap();
        assert!(message.starts_with("Invalid arguments for describe_table"));
        assert_eq!(final_answer(&conversation), "Sorry, I could not find that.");
    }

    #[tokio::test]
    async fn test_model_failure_aborts_invocation() {
        let client = ScriptedClient::new(vec![Err(LLMError::AuthError("bad key".into()))]);
        let err = agent(client, MockDataStore::new()).invoke("q").await.unwrap_err();
        assert!(matches!(err, AgentError::ModelUnavailable(ref e) if e.attempts == 1));
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let client = ScriptedClient::new(vec![
            Err(LLMError::RateLimitError("slow down".into())),
            reply(vec![Part::text("ok")]),
        ]);
        let config = AgentConfig {
            retry: RetryPolicy {
                initial_delay: std::time::Duration::from_millis(1),
                ..RetryPolicy::default()
            },
            ..AgentConfig::default()
        };
        let agent = Agent::new(
            client.clone(),
            ToolRegistry::new(Arc::new(MockDataStore::new())),
            config,
        );

        assert_eq!(agent.invoke("q").await.unwrap(), "ok");
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_text_uses_fallback() {
        let client = ScriptedClient::new(vec![reply(Vec::new())]);
        let answer = agent(client, MockDataStore::new()).invoke("q").await.unwrap();
        assert_eq!(answer, NO_RESPONSE);
    }

    #[tokio::test]
    async fn test_step_cap() {
        let looping = || reply(vec![Part::function_call("list_tables", json!({}))]);
        let client = ScriptedClient::new(vec![looping(), looping(), looping()]);
        let mut store = MockDataStore::new();
        // The second response's calls are never run.
        store
            .expect_list_tables()
            .times(1)
            .returning(|| Ok(vec!["customers".to_string()]));
        let config = AgentConfig {
            max_steps: Some(2),
            ..config()
        };
        let agent = Agent::new(client.clone(), ToolRegistry::new(Arc::new(store)), config);

        let err = agent.invoke("q").await.unwrap_err();
        assert!(matches!(err, AgentError::MaxStepsExceeded(2)));
        assert_eq!(client.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_cap_of_one_skips_requested_tools() {
        let client = ScriptedClient::new(vec![reply(vec![Part::function_call(
            "run_query",
            json!({"query": "DELETE FROM customers"}),
        )])]);
        let config = AgentConfig {
            max_steps: Some(1),
            ..config()
        };
        // No expectations: running the query would panic.
        let agent = Agent::new(
            client.clone(),
            ToolRegistry::new(Arc::new(MockDataStore::new())),
            config,
        );

        let err = agent.invoke("q").await.unwrap_err();
        assert!(matches!(err, AgentError::MaxStepsExceeded(1)));
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_answer_on_last_allowed_step_succeeds() {
        let client = ScriptedClient::new(vec![
            reply(vec![Part::function_call("list_tables", json!({}))]),
            reply(vec![Part::text("customers")]),
        ]);
        let mut store = MockDataStore::new();
        store
            .expect_list_tables()
            .returning(|| Ok(vec!["customers".to_string()]));
        let config = AgentConfig {
            max_steps: Some(2),
            ..config()
        };
        let agent = Agent::new(client, ToolRegistry::new(Arc::new(store)), config);

        assert_eq!(agent.invoke("q").await.unwrap(), "customers");
    }

    #[tokio::test]
    async fn test_use_tool_without_calls_is_an_invariant_violation() {
        let agent = agent(ScriptedClient::new(Vec::new()), MockDataStore::new());
        let mut conversation = Conversation::new("q");

        let err = agent.use_tool(&mut conversation).await.unwrap_err();
        assert!(matches!(err, AgentError::InvariantViolation(_)));
        assert_eq!(conversation.len(), 1);
    }
}
