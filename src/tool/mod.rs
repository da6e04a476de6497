pub mod executor;
pub mod normalize;
pub mod registry;

pub use executor::ToolExecutor;
pub use normalize::{normalize, RawOutput, SchemaViolation, ToolResult};
pub use registry::{DescribeTableArgs, ListTablesArgs, RunQueryArgs, SqlTool, ToolKind, ToolRegistry};
pub use tool_types::{ToolDefinition, ToolError};

mod tool_types {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use crate::store::StoreError;

    /// Declaration of a tool that the model may call.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ToolDefinition {
        /// The name of the tool
        pub name: String,
        /// A description of what the tool does
        pub description: String,
        /// JSON Schema for the tool's input parameters
        pub input_schema: Value,
    }

    impl ToolDefinition {
        /// Returns true if the schema declares at least one property.
        pub fn has_parameters(&self) -> bool {
            self.input_schema
                .get("properties")
                .and_then(Value::as_object)
                .is_some_and(|props| !props.is_empty())
        }
    }

    /// Errors that can occur when dispatching a tool call.
    ///
    /// None of these abort a conversation; they are reported back to the model.
    #[derive(Debug, thiserror::Error)]
    pub enum ToolError {
        #[error("Unknown tool: {0}")]
        UnknownTool(String),
        #[error("Invalid arguments for {tool}: {reason}")]
        InvalidArguments { tool: String, reason: String },
        #[error("Tool {tool} failed: {source}")]
        ExecutionFailed {
            tool: String,
            #[source]
            source: StoreError,
        },
        #[error(transparent)]
        SchemaViolation(#[from] super::SchemaViolation),
    }
}
