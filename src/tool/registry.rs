use indexmap::IndexMap;
use schemars::r#gen::SchemaSettings;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::store::{DataStore, QueryOutcome};
use crate::tool::{RawOutput, ToolDefinition, ToolError};

/// Arguments of `list_tables`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, JsonSchema)]
pub struct ListTablesArgs {}

/// Arguments of `describe_table`.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct DescribeTableArgs {
    /// Name of the table to describe
    pub table_name: String,
}

/// Arguments of `run_query`.
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct RunQueryArgs {
    /// A single SQLite SELECT statement
    pub query: String,
}

/// The kinds of tool the agent offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ListTables,
    DescribeTable,
    RunQuery,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [ToolKind::ListTables, ToolKind::DescribeTable, ToolKind::RunQuery];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::ListTables => "list_tables",
            ToolKind::DescribeTable => "describe_table",
            ToolKind::RunQuery => "run_query",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::ListTables => "List the tables available in the SQLite database.",
            ToolKind::DescribeTable => {
                "Get the schema and the number of rows in the given table."
            }
            ToolKind::RunQuery => {
                "Run a SQL query against the SQLite database and return the results."
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn definition(&self) -> ToolDefinition {
        let input_schema = match self {
            ToolKind::ListTables => parameters_schema::<ListTablesArgs>(),
            ToolKind::DescribeTable => parameters_schema::<DescribeTableArgs>(),
            ToolKind::RunQuery => parameters_schema::<RunQueryArgs>(),
        };
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed, typed tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlTool {
    ListTables(ListTablesArgs),
    DescribeTable(DescribeTableArgs),
    RunQuery(RunQueryArgs),
}

impl SqlTool {
    /// Parses a model-requested call by name and JSON arguments.
    pub fn parse(name: &str, args: Value) -> Result<Self, ToolError> {
        let kind = ToolKind::from_name(name).ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        // Providers send `null` or omit args for parameterless calls.
        let args = if args.is_null() { Value::Object(Default::default()) } else { args };
        let invalid = |e: serde_json::Error| ToolError::InvalidArguments {
            tool: name.to_string(),
            reason: e.to_string(),
        };

        Ok(match kind {
            ToolKind::ListTables => SqlTool::ListTables(serde_json::from_value(args).map_err(invalid)?),
            ToolKind::DescribeTable => {
                SqlTool::DescribeTable(serde_json::from_value(args).map_err(invalid)?)
            }
            ToolKind::RunQuery => SqlTool::RunQuery(serde_json::from_value(args).map_err(invalid)?),
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            SqlTool::ListTables(_) => ToolKind::ListTables,
            SqlTool::DescribeTable(_) => ToolKind::DescribeTable,
            SqlTool::RunQuery(_) => ToolKind::RunQuery,
        }
    }
}

/// Generates a provider-friendly JSON schema for a tool's argument struct.
fn parameters_schema<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::openapi3().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let root = settings.into_generator().into_root_schema_for::<T>();
    let mut schema = serde_json::to_value(root.schema).unwrap_or_default();
    if let Some(obj) = schema.as_object_mut() {
        obj.remove("title");
    }
    schema
}

/// The fixed set of tools the agent can run, bound to a data store.
#[derive(Clone)]
pub struct ToolRegistry {
    store: Arc<dyn DataStore>,
    definitions: Vec<ToolDefinition>,
}

impl ToolRegistry {
    /// Creates a registry exposing every [`ToolKind`] over the given store.
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        let definitions = ToolKind::ALL.iter().map(ToolKind::definition).collect();
        Self { store, definitions }
    }

    /// Returns the number of registered tools.
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Declarations passed to the model.
    pub fn to_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    /// Parses and runs a call by name.
    pub async fn dispatch(&self, name: &str, args: Value) -> Result<RawOutput, ToolError> {
        let tool = SqlTool::parse(name, args)?;
        self.execute(&tool).await
    }

    /// Runs a typed call against the store.
    pub async fn execute(&self, tool: &SqlTool) -> Result<RawOutput, ToolError> {
        let kind = tool.kind();
        let failed = |source| ToolError::ExecutionFailed {
            tool: kind.name().to_string(),
            source,
        };
        debug!(tool = %kind, "Dispatching tool");

        let mut fields: IndexMap<String, RawOutput> = IndexMap::new();
        match tool {
            SqlTool::ListTables(_) => {
                let tables = self.store.list_tables().await.map_err(failed)?;
                fields.insert("tables".to_string(), tables.into());
            }
            SqlTool::DescribeTable(args) => {
                let description = self
                    .store
                    .describe_table(&args.table_name)
                    .await
                    .map_err(failed)?;
                fields.insert("schema".to_string(), description.schema.into());
                fields.insert("row_count".to_string(), description.row_count.into());
            }
            SqlTool::RunQuery(args) => {
                match self.store.run_query(&args.query).await.map_err(failed)? {
                    QueryOutcome::Rows(rows) => return Ok(rows.into()),
                    QueryOutcome::Failed(message) => {
                        fields.insert("error".to_string(), message.into());
                    }
                }
            }
        }
        Ok(RawOutput::Record(fields))
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools_count", &self.definitions.len())
            .finish()
    }
}
