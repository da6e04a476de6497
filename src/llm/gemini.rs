use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{FinishReason, LLMClient, LLMError, LLMInput, LLMOutput, Usage};
use crate::session::{Part, Role};
use crate::tool::ToolDefinition;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Request body for `models/{model}:generateContent`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: UsageMetadata,
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

/// An LLM client for the Gemini API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: String,
}

impl GeminiClient {
    /// Creates a new Gemini client.
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, LLMError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            reqwest::header::HeaderValue::from_str(&api_key)
                .map_err(|e| LLMError::AuthError(format!("Invalid API key: {e}")))?,
        );

        let mut client_builder = Client::builder().default_headers(headers);
        if let Some(timeout) = timeout {
            client_builder = client_builder.timeout(timeout);
        }

        Ok(Self {
            client: client_builder.build()?,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        })
    }

    fn build_request(input: &LLMInput) -> GenerateContentRequest {
        let system_instruction = (!input.system_prompt.is_empty()).then(|| Content {
            role: None,
            parts: vec![json!({ "text": input.system_prompt })],
        });

        let contents = input
            .turns
            .iter()
            .map(|turn| Content {
                role: Some(
                    match turn.role {
                        Role::Model => "model",
                        // Function responses travel in user-role content.
                        Role::User | Role::Tool => "user",
                    }
                    .to_string(),
                ),
                parts: turn.parts.iter().map(Self::part_to_wire).collect(),
            })
            .collect();

        let tools = if input.tools.is_empty() {
            Vec::new()
        } else {
            let declarations: Vec<Value> = input.tools.iter().map(Self::declaration).collect();
            vec![json!({ "functionDeclarations": declarations })]
        };

        GenerateContentRequest {
            system_instruction,
            contents,
            tools,
            generation_config: GenerationConfig {
                max_output_tokens: input.max_tokens,
                temperature: input.temperature,
            },
        }
    }

    fn declaration(tool: &ToolDefinition) -> Value {
        let mut declaration = json!({
            "name": tool.name,
            "description": tool.description,
        });
        // Gemini rejects object schemas without properties.
        if tool.has_parameters() {
            declaration["parameters"] = tool.input_schema.clone();
        }
        declaration
    }

    fn part_to_wire(part: &Part) -> Value {
        match part {
            Part::Text(text) => json!({ "text": text }),
            Part::FunctionCall { name, args, .. } => {
                json!({ "functionCall": { "name": name, "args": args } })
            }
            Part::FunctionResponse { name, response, .. } => {
                json!({ "functionResponse": { "name": name, "response": response } })
            }
        }
    }

    fn part_from_wire(value: &Value) -> Option<Part> {
        if let Some(text) = value.get("text").and_then(Value::as_str) {
            return Some(Part::Text(text.to_string()));
        }
        let call = value.get("functionCall")?;
        Some(Part::FunctionCall {
            id: call.get("id").and_then(Value::as_str).map(str::to_string),
            name: call.get("name")?.as_str()?.to_string(),
            args: call.get("args").cloned().unwrap_or_else(|| json!({})),
        })
    }

    fn parse_response(body: &str) -> Result<LLMOutput, LLMError> {
        let response: GenerateContentResponse = serde_json::from_str(body)
            .map_err(|e| LLMError::InvalidResponse(format!("{}: {}", e, body)))?;

        let Some(candidate) = response.candidates.into_iter().next() else {
            return Err(LLMError::InvalidResponse(match response.prompt_feedback {
                Some(feedback) => format!("No candidates in response, prompt feedback: {feedback}"),
                None => "No candidates in response".to_string(),
            }));
        };

        let parts: Vec<Part> = candidate
            .content
            .map(|content| content.parts.iter().filter_map(Self::part_from_wire).collect())
            .unwrap_or_default();

        let finish_reason = if parts.iter().any(Part::is_function_call) {
            FinishReason::ToolCalls
        } else {
            match candidate.finish_reason.as_deref() {
                Some("STOP") | None => FinishReason::Stop,
                Some("MAX_TOKENS") => FinishReason::MaxTokens,
                Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") => FinishReason::Safety,
                Some(_) => FinishReason::Other,
            }
        };

        Ok(LLMOutput {
            parts,
            finish_reason,
            usage: Usage {
                input_tokens: response.usage_metadata.prompt_token_count,
                output_tokens: response.usage_metadata.candidates_token_count,
            },
        })
    }
}

#[async_trait]
impl LLMClient for GeminiClient {
    async fn complete(&self, input: LLMInput) -> Result<LLMOutput, LLMError> {
        let body = Self::build_request(&input);
        let url = format!("{}/models/{}:generateContent", self.base_url, input.model);

        debug!(model = %input.model, turns = input.turns.len(), "Sending request to Gemini");

        let response = self.client.post(&url).json(&body).send().await?;
        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(LLMError::from_status(status, response_text));
        }

        tracing::debug!("LLM response: {}", response_text);
        Self::parse_response(&response_text)
    }
}
