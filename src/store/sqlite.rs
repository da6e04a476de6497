//! SQLite-backed data store

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Decode, Row, Sqlite, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{quote_identifier, Cell, DataStore, QueryOutcome, Record, StoreError, TableDescription};

/// A handle to a SQLite database file.
///
/// Holds no connection. Every operation opens its own connection and closes it
/// before returning, so no transaction spans two tool calls.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    options: SqliteConnectOptions,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Creates a handle for an existing database file.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self::with_create(db_path, false)
    }

    /// Creates a handle that creates the database file on first connect.
    pub fn create<P: AsRef<Path>>(db_path: P) -> Self {
        Self::with_create(db_path, true)
    }

    fn with_create<P: AsRef<Path>>(db_path: P, create: bool) -> Self {
        let db_path = db_path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(create);
        Self { options, db_path }
    }

    /// Get the path to the database file
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) async fn connect(&self) -> Result<SqliteConnection, StoreError> {
        self.options.connect().await.map_err(StoreError::Connection)
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    async fn list_tables(&self) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connect().await?;
        let names: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table'")
                .fetch_all(&mut conn)
                .await?;
        conn.close().await?;

        debug!(count = names.len(), "Listed tables");
        Ok(names)
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableDescription, StoreError> {
        let table = quote_identifier(table_name);
        let mut conn = self.connect().await?;

        let schema_rows = sqlx::query(&format!("PRAGMA table_info({table})"))
            .fetch_all(&mut conn)
            .await?;
        if schema_rows.is_empty() {
            conn.close().await?;
            return Err(StoreError::TableNotFound(table_name.to_string()));
        }
        let schema = schema_rows
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;

        let row_count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&mut conn)
            .await?;
        conn.close().await?;

        debug!(table = table_name, columns = schema.len(), row_count, "Described table");
        Ok(TableDescription { schema, row_count })
    }

    async fn run_query(&self, sql: &str) -> Result<QueryOutcome, StoreError> {
        let mut conn = self.connect().await?;
        let outcome = match sqlx::query(sql).fetch_all(&mut conn).await {
            Ok(rows) => match rows.iter().map(decode_row).collect::<Result<Vec<_>, _>>() {
                Ok(records) => QueryOutcome::Rows(records),
                Err(e) => QueryOutcome::Failed(format!("Error: {e}")),
            },
            Err(e) => QueryOutcome::Failed(format!("Error: {}", query_error_message(&e))),
        };
        conn.close().await?;

        match &outcome {
            QueryOutcome::Rows(rows) => debug!(rows = rows.len(), "Query succeeded"),
            QueryOutcome::Failed(message) => debug!(%message, "Query failed"),
        }
        Ok(outcome)
    }
}

/// Prefers the bare database message over sqlx's wrapper text.
fn query_error_message(error: &sqlx::Error) -> String {
    match error {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}

/// Decodes a row of unknown shape by the storage class of each value.
fn decode_row(row: &SqliteRow) -> Result<Record, sqlx::Error> {
    let mut record = Record::with_capacity(row.len());
    for column in row.columns() {
        let raw = row.try_get_raw(column.ordinal())?;
        let cell = if raw.is_null() {
            Cell::Null
        } else {
            let type_name = raw.type_info().name().to_ascii_uppercase();
            match type_name.as_str() {
                "INTEGER" | "BIGINT" | "INT8" | "BOOLEAN" => {
                    Cell::Integer(<i64 as Decode<'_, Sqlite>>::decode(raw).map_err(sqlx::Error::Decode)?)
                }
                "REAL" | "NUMERIC" => {
                    Cell::Real(<f64 as Decode<'_, Sqlite>>::decode(raw).map_err(sqlx::Error::Decode)?)
                }
                "BLOB" => Cell::Blob(
                    <Vec<u8> as Decode<'_, Sqlite>>::decode(raw).map_err(sqlx::Error::Decode)?,
                ),
                _ => Cell::Text(
                    <String as Decode<'_, Sqlite>>::decode(raw).map_err(sqlx::Error::Decode)?,
                ),
            }
        };
        record.insert(column.name().to_string(), cell);
    }
    Ok(record)
}
