use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::session::Part;
use crate::tool::{normalize, RawOutput, ToolDefinition, ToolError, ToolRegistry};

/// Turns model-requested function calls into function responses.
///
/// Every failure (unknown tool, bad arguments, store error, schema violation)
/// becomes an `{"error": ...}` response so the conversation can continue.
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    registry: ToolRegistry,
}

impl ToolExecutor {
    /// Creates a new tool executor with the given registry.
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Returns all tool definitions for passing to the LLM.
    pub fn get_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.registry.to_tool_definitions()
    }

    /// Executes a single call and builds its response part.
    pub async fn execute(&self, id: Option<&str>, name: &str, args: &Value) -> Part {
        let raw = self.registry.dispatch(name, args.clone()).await;
        respond(id, name, raw)
    }

    /// Executes the given calls sequentially, in request order.
    ///
    /// Parts that are not function calls are skipped.
    pub async fn execute_all<'a>(&self, calls: impl IntoIterator<Item = &'a Part>) -> Vec<Part> {
        let mut results = Vec::new();

        for call in calls {
            if let Part::FunctionCall { id, name, args } = call {
                results.push(self.execute(id.as_deref(), name, args).await);
            }
        }

        results
    }
}

/// Normalizes a dispatch outcome into a function response.
///
/// Success is wrapped as `{"data": ...}`; any error, including a result of the
/// wrong shape, becomes `{"error": ...}`.
pub fn respond(id: Option<&str>, name: &str, raw: Result<RawOutput, ToolError>) -> Part {
    let outcome = raw.and_then(|raw| Ok(normalize(raw)?));
    let response = match outcome {
        Ok(result) => {
            debug!(tool = name, "Tool call succeeded");
            result.into_response()
        }
        Err(error) => {
            warn!(tool = name, %error, "Tool call failed");
            json!({ "error": error.to_string() })
        }
    };

    Part::FunctionResponse {
        id: id.map(str::to_string),
        name: name.to_string(),
        response,
    }
}
