//! Data store access for the agent's tools.
//!
//! The agent only sees the [`DataStore`] trait. [`SqliteStore`] is the production
//! implementation; tests substitute fakes.

pub mod loader;
pub mod sqlite;

use async_trait::async_trait;
use indexmap::IndexMap;

pub use loader::{load_csv, parse_csv, CsvSource, LoadReport};
pub use sqlite::SqliteStore;

/// A single value read from the store, tagged with its storage class.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

/// A row, with columns in result order.
pub type Record = IndexMap<String, Cell>;

/// Schema and size of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescription {
    /// One record per column, as reported by `PRAGMA table_info`
    pub schema: Vec<Record>,
    pub row_count: i64,
}

/// Outcome of running arbitrary SQL.
///
/// Query failures are reported as data, not as errors, so the model can read the
/// message and rephrase.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Rows(Vec<Record>),
    Failed(String),
}

/// Storage class of a column in the fixed `customers` schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
}

impl ColumnType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
        }
    }
}

/// Name of the only table the agent is told about.
pub const CUSTOMERS_TABLE: &str = "customers";

/// Columns of the `customers` table, in declaration order.
pub const CUSTOMERS_COLUMNS: &[(&str, ColumnType)] = &[
    ("first_name", ColumnType::Text),
    ("last_name", ColumnType::Text),
    ("email", ColumnType::Text),
    ("phone", ColumnType::Text),
    ("address", ColumnType::Text),
    ("gender", ColumnType::Text),
    ("age", ColumnType::Integer),
    ("registered", ColumnType::Text),
    ("orders", ColumnType::Integer),
    ("spent", ColumnType::Real),
    ("job", ColumnType::Text),
    ("hobbies", ColumnType::Text),
    ("is_married", ColumnType::Integer),
];

/// Errors from the data store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Could not open the database
    #[error("Connection error: {0}")]
    Connection(#[source] sqlx::Error),
    /// A statement issued by the adapter itself failed
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
    /// The requested table does not exist
    #[error("Table not found: {0}")]
    TableNotFound(String),
    /// CSV input could not be parsed
    #[error("CSV error on line {line}: {reason}")]
    Csv { line: usize, reason: String },
    /// Remote CSV could not be fetched
    #[error("Fetch error: {0}")]
    Fetch(#[from] reqwest::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Schema inspection and query execution against a relational store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Lists the names of all tables.
    async fn list_tables(&self) -> Result<Vec<String>, StoreError>;

    /// Returns the column schema and row count of a table.
    async fn describe_table(&self, table_name: &str) -> Result<TableDescription, StoreError>;

    /// Runs SQL text and returns its rows, or the failure message.
    async fn run_query(&self, sql: &str) -> Result<QueryOutcome, StoreError>;
}

/// Quotes an identifier for interpolation into SQL.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("customers"), "\"customers\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_customers_schema_shape() {
        assert_eq!(CUSTOMERS_COLUMNS.len(), 13);
        assert_eq!(CUSTOMERS_COLUMNS[9], ("spent", ColumnType::Real));
        assert_eq!(CUSTOMERS_COLUMNS[12].1.as_sql(), "INTEGER");
    }
}
