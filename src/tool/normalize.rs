//! Conversion of raw tool output into JSON-safe, shape-checked results.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::store::{Cell, Record};

/// Output of a tool before normalization.
///
/// Leaves are either store cells, which carry SQLite storage classes, or plain
/// JSON values, which pass through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum RawOutput {
    Value(Value),
    Cell(Cell),
    List(Vec<RawOutput>),
    Record(IndexMap<String, RawOutput>),
}

/// A normalized tool result: rows of records, or one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolResult {
    Rows(Vec<Map<String, Value>>),
    Single(Map<String, Value>),
}

/// Raised when normalized output is neither a record nor a list of records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Schema violation: expected a record or a list of records, found {found}")]
pub struct SchemaViolation {
    pub found: String,
}

impl ToolResult {
    pub fn to_value(&self) -> Value {
        match self {
            ToolResult::Rows(rows) => {
                Value::Array(rows.iter().cloned().map(Value::Object).collect())
            }
            ToolResult::Single(record) => Value::Object(record.clone()),
        }
    }

    /// The success payload of a function response.
    pub fn into_response(self) -> Value {
        let mut envelope = Map::new();
        envelope.insert("data".to_string(), self.to_value());
        Value::Object(envelope)
    }
}

/// Converts raw output to plain JSON and checks its shape.
///
/// Normalizing the JSON form of a returned [`ToolResult`] gives the same result.
pub fn normalize(raw: impl Into<RawOutput>) -> Result<ToolResult, SchemaViolation> {
    match to_plain(raw.into()) {
        Value::Object(record) => Ok(ToolResult::Single(record)),
        Value::Array(items) => {
            let mut rows = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(record) => rows.push(record),
                    other => {
                        return Err(SchemaViolation {
                            found: format!("a list containing {} at index {index}", kind(&other)),
                        });
                    }
                }
            }
            Ok(ToolResult::Rows(rows))
        }
        other => Err(SchemaViolation {
            found: kind(&other).to_string(),
        }),
    }
}

fn to_plain(raw: RawOutput) -> Value {
    match raw {
        RawOutput::Value(value) => value,
        RawOutput::Cell(cell) => cell_to_value(cell),
        RawOutput::List(items) => Value::Array(items.into_iter().map(to_plain).collect()),
        RawOutput::Record(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key, to_plain(value)))
                .collect(),
        ),
    }
}

fn cell_to_value(cell: Cell) -> Value {
    match cell {
        Cell::Null => Value::Null,
        Cell::Integer(v) => Value::Number(v.into()),
        // JSON has no NaN or infinity
        Cell::Real(v) => Number::from_f64(v).map_or(Value::Null, Value::Number),
        Cell::Text(v) => Value::String(v),
        Cell::Blob(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a record",
    }
}

impl From<Value> for RawOutput {
    fn from(value: Value) -> Self {
        RawOutput::Value(value)
    }
}

impl From<Cell> for RawOutput {
    fn from(cell: Cell) -> Self {
        RawOutput::Cell(cell)
    }
}

impl From<String> for RawOutput {
    fn from(value: String) -> Self {
        RawOutput::Value(Value::String(value))
    }
}

impl From<&str> for RawOutput {
    fn from(value: &str) -> Self {
        RawOutput::Value(Value::String(value.to_string()))
    }
}

impl From<i64> for RawOutput {
    fn from(value: i64) -> Self {
        RawOutput::Value(Value::Number(value.into()))
    }
}

impl From<Record> for RawOutput {
    fn from(record: Record) -> Self {
        RawOutput::Record(
            record
                .into_iter()
                .map(|(key, cell)| (key, RawOutput::Cell(cell)))
                .collect(),
        )
    }
}

impl From<IndexMap<String, RawOutput>> for RawOutput {
    fn from(fields: IndexMap<String, RawOutput>) -> Self {
        RawOutput::Record(fields)
    }
}

impl<T: Into<RawOutput>> From<Vec<T>> for RawOutput {
    fn from(items: Vec<T>) -> Self {
        RawOutput::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<ToolResult> for RawOutput {
    fn from(result: ToolResult) -> Self {
        RawOutput::Value(result.to_value())
    }
}
