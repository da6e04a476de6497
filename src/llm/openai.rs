use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::{FinishReason, LLMClient, LLMError, LLMInput, LLMOutput, Usage};
use crate::session::{Part, Role};

/// OpenAI API response for chat completions.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageResponse,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    #[serde(default)]
    id: String,
    function: FunctionCall,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Default, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// An LLM client for OpenAI-compatible chat completion APIs.
#[derive(Debug, Clone)]
pub struct OpenAIClient {
    client: Client,
    base_url: String,
}

impl OpenAIClient {
    /// Creates a new OpenAI client.
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, LLMError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LLMError::AuthError(format!("Invalid API key: {e}")))?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let mut client_builder = reqwest::Client::builder()
            .default_headers(headers)
            .http1_title_case_headers();

        if let Some(timeout) = timeout {
            client_builder = client_builder.timeout(timeout);
        }

        Ok(Self {
            client: client_builder.build()?,
            base_url: base_url
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Creates a request builder for chat completions.
    fn chat_completions_request(&self, input: &LLMInput) -> RequestBuilder {
        let body = Self::build_body(input);

        debug!(model = %input.model, "Sending request to OpenAI");

        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body)
    }

    fn build_body(input: &LLMInput) -> ChatRequest {
        let tools: Vec<Value> = input
            .tools
            .iter()
            .map(|tool| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.input_schema,
                    }
                })
            })
            .collect();

        ChatRequest {
            model: input.model.clone(),
            messages: Self::build_messages(input),
            tools: if tools.is_empty() { None } else { Some(tools) },
            max_tokens: Some(input.max_tokens),
            temperature: input.temperature,
        }
    }

    /// Builds messages for the API request.
    ///
    /// Calls without a provider id get positional ids, which the matching tool
    /// turn reproduces because responses keep call order.
    fn build_messages(input: &LLMInput) -> Vec<Value> {
        let mut messages = Vec::new();

        // Add system prompt
        if !input.system_prompt.is_empty() {
            messages.push(serde_json::json!({
                "role": "system",
                "content": input.system_prompt
            }));
        }

        for turn in &input.turns {
            match turn.role {
                Role::User => {
                    messages.push(serde_json::json!({
                        "role": "user",
                        "content": turn.text().unwrap_or_default()
                    }));
                }
                Role::Model => {
                    let tool_calls = turn
                        .parts
                        .iter()
                        .filter_map(|part| match part {
                            Part::FunctionCall { id, name, args } => Some((id, name, args)),
                            _ => None,
                        })
                        .enumerate()
                        .map(|(index, (id, name, args))| {
                            serde_json::json!({
                                "id": call_id(id.as_deref(), index),
                                "type": "function",
                                "function": {
                                    "name": name,
                                    "arguments": args.to_string()
                                }
                            })
                        })
                        .collect::<Vec<_>>();

                    if !tool_calls.is_empty() {
                        messages.push(serde_json::json!({
                            "role": "assistant",
                            "content": turn.text(),
                            "tool_calls": tool_calls
                        }));
                    } else {
                        messages.push(serde_json::json!({
                            "role": "assistant",
                            "content": turn.text().unwrap_or_default()
                        }));
                    }
                }
                Role::Tool => {
                    let responses = turn.parts.iter().filter_map(|part| match part {
                        Part::FunctionResponse { id, response, .. } => Some((id, response)),
                        _ => None,
                    });
                    for (index, (id, response)) in responses.enumerate() {
                        messages.push(serde_json::json!({
                            "role": "tool",
                            "tool_call_id": call_id(id.as_deref(), index),
                            "content": response.to_string()
                        }));
                    }
                }
            }
        }

        messages
    }

    fn parse_response(response_text: &str) -> Result<LLMOutput, LLMError> {
        let response: ChatCompletionResponse = serde_json::from_str(response_text)
            .map_err(|e| LLMError::InvalidResponse(format!("{}: {}", e, response_text)))?;

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(LLMError::InvalidResponse(format!(
                "No choices in response. Response: {}",
                response_text
            )));
        };

        let mut parts = Vec::new();

        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            parts.push(Part::Text(text));
        }

        for tool_call in choice.message.tool_calls.unwrap_or_default() {
            // Unparseable arguments are kept as a string so the tool call fails
            // with an argument error the model can see.
            let args: Value = if tool_call.function.arguments.is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(&tool_call.function.arguments)
                    .unwrap_or(Value::String(tool_call.function.arguments))
            };

            parts.push(Part::FunctionCall {
                id: (!tool_call.id.is_empty()).then_some(tool_call.id),
                name: tool_call.function.name,
                args,
            });
        }

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("length") => FinishReason::MaxTokens,
            Some("content_filter") => FinishReason::Safety,
            _ => FinishReason::Other,
        };

        Ok(LLMOutput {
            parts,
            finish_reason,
            usage: Usage {
                input_tokens: response.usage.prompt_tokens,
                output_tokens: response.usage.completion_tokens,
            },
        })
    }
}

fn call_id(id: Option<&str>, index: usize) -> String {
    id.map(str::to_string).unwrap_or_else(|| format!("call_{index}"))
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn complete(&self, input: LLMInput) -> Result<LLMOutput, LLMError> {
        let response = self.chat_completions_request(&input).send().await?;
        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(LLMError::from_status(status, response_text));
        }

        tracing::debug!("LLM response: {}", response_text);
        Self::parse_response(&response_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Turn;
    use crate::tool::ToolKind;
    use serde_json::json;

    #[test]
    fn test_build_messages_pairs_call_ids() {
        let input = LLMInput {
            model: "gpt-4o".into(),
            turns: vec![
                Turn::new_user("List the tables"),
                Turn::new_model(vec![Part::function_call("list_tables", json!({}))]),
                Turn::new_tool(vec![Part::FunctionResponse {
                    id: None,
                    name: "list_tables".into(),
                    response: json!({"data": {"tables": ["customers"]}}),
                }]),
            ],
            system_prompt: "sys".into(),
            tools: ToolKind::ALL.iter().map(ToolKind::definition).collect(),
            max_tokens: 256,
            temperature: Some(0.0),
        };

        let body = serde_json::to_value(OpenAIClient::build_body(&input)).unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["tool_calls"][0]["id"], "call_0");
        assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(messages[3]["tool_call_id"], "call_0");
        assert_eq!(
            messages[3]["content"],
            r#"{"data":{"tables":["customers"]}}"#
        );
        assert_eq!(body["tools"].as_array().unwrap().len(), 3);
        assert_eq!(body["tools"][1]["function"]["name"], "describe_table");
    }

    #[test]
    fn test_parse_tool_calls() {
        let body = r#"{
            "choices": [{
                "message": {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_abc", "type": "function",
                     "function": {"name": "run_query", "arguments": "{\"query\": \"SELECT 1\"}"}}
                ]},
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }"#;
        let output = OpenAIClient::parse_response(body).unwrap();
        assert_eq!(output.finish_reason, FinishReason::ToolCalls);
        assert_eq!(
            output.parts,
            vec![Part::FunctionCall {
                id: Some("call_abc".into()),
                name: "run_query".into(),
                args: json!({"query": "SELECT 1"}),
            }]
        );
    }

    #[test]
    fn test_parse_malformed_arguments() {
        let body = r#"{"choices": [{"message": {"tool_calls": [
            {"id": "c", "function": {"name": "run_query", "arguments": "{not json"}}
        ]}, "finish_reason": "tool_calls"}]}"#;
        let output = OpenAIClient::parse_response(body).unwrap();
        assert!(matches!(
            &output.parts[0],
            Part::FunctionCall { args: Value::String(raw), .. } if raw == "{not json"
        ));
    }

    #[test]
    fn test_parse_empty_choices() {
        assert!(OpenAIClient::parse_response(r#"{"choices": []}"#).is_err());
    }

    /// Reads one request, answers with a body shorter than its Content-Length, and hangs up.
    async fn serve_truncated_body() -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                request.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
                if n == 0 {
                    break;
                }
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 500\r\n\r\n{\"choices\"")
                .await
                .unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_cut_off_body_is_a_retryable_network_error() {
        let base_url = serve_truncated_body().await;
        let client = OpenAIClient::new("sk-test".into(), Some(base_url), None).unwrap();
        let input = LLMInput {
            model: "gpt-4o".into(),
            turns: vec![Turn::new_user("hi")],
            system_prompt: "sys".into(),
            tools: Vec::new(),
            max_tokens: 16,
            temperature: None,
        };

        let err = client.complete(input).await.unwrap_err();
        assert!(matches!(err, LLMError::NetworkError(_)), "got {err:?}");
        assert!(err.is_transient());
    }
}
