//! Imports the customers CSV into SQLite.

use sqlx::Connection;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::{quote_identifier, Cell, ColumnType, SqliteStore, StoreError, CUSTOMERS_COLUMNS, CUSTOMERS_TABLE};

/// Where the CSV comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvSource {
    Path(PathBuf),
    Url(String),
}

impl From<&str> for CsvSource {
    fn from(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") {
            CsvSource::Url(value.to_string())
        } else {
            CsvSource::Path(PathBuf::from(value))
        }
    }
}

/// Summary of a completed import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_inserted: usize,
    /// CSV header columns that are not part of the table
    pub ignored_columns: Vec<String>,
}

/// Replaces the `customers` table with the contents of a CSV file.
///
/// All rows are inserted in one transaction.
pub async fn load_csv(source: &CsvSource, store: &SqliteStore) -> Result<LoadReport, StoreError> {
    let text = match source {
        CsvSource::Path(path) => tokio::fs::read_to_string(path).await?,
        CsvSource::Url(url) => {
            info!(%url, "Fetching CSV");
            reqwest::Client::new()
                .get(url)
                .header(reqwest::header::USER_AGENT, "Mozilla/5.0")
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?
        }
    };

    let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
    let mut records = parse_csv(text)?.into_iter();
    let header = records.next().ok_or(StoreError::Csv {
        line: 1,
        reason: "missing header row".to_string(),
    })?;

    // Position of each table column in the CSV, if present.
    let positions: Vec<Option<usize>> = CUSTOMERS_COLUMNS
        .iter()
        .map(|(name, _)| header.iter().position(|h| h.trim() == *name))
        .collect();
    let missing: Vec<&str> = CUSTOMERS_COLUMNS
        .iter()
        .zip(&positions)
        .filter(|(_, position)| position.is_none())
        .map(|((name, _), _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(StoreError::Csv {
            line: 1,
            reason: format!("header is missing columns: {}", missing.join(", ")),
        });
    }
    let ignored_columns: Vec<String> = header
        .iter()
        .filter(|h| !CUSTOMERS_COLUMNS.iter().any(|(name, _)| *name == h.trim()))
        .cloned()
        .collect();
    if !ignored_columns.is_empty() {
        warn!(columns = ?ignored_columns, "Ignoring CSV columns not in the customers table");
    }

    let table = quote_identifier(CUSTOMERS_TABLE);
    let column_defs = CUSTOMERS_COLUMNS
        .iter()
        .map(|(name, ty)| format!("{} {}", name, ty.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; CUSTOMERS_COLUMNS.len()].join(", ");
    let insert_sql = format!("INSERT INTO {table} VALUES ({placeholders})");

    let mut conn = store.connect().await?;
    let mut tx = conn.begin().await?;
    sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&format!("CREATE TABLE {table} ({column_defs})"))
        .execute(&mut *tx)
        .await?;

    let mut rows_inserted = 0;
    for fields in records {
        if fields.iter().all(|f| f.is_empty()) {
            continue;
        }
        let mut query = sqlx::query(&insert_sql);
        for ((_, ty), position) in CUSTOMERS_COLUMNS.iter().zip(&positions) {
            let raw = position.and_then(|i| fields.get(i)).map(String::as_str);
            query = match coerce(raw, *ty) {
                Cell::Null => query.bind(None::<String>),
                Cell::Integer(v) => query.bind(v),
                Cell::Real(v) => query.bind(v),
                Cell::Text(v) => query.bind(v),
                Cell::Blob(v) => query.bind(v),
            };
        }
        query.execute(&mut *tx).await?;
        rows_inserted += 1;
    }
    tx.commit().await?;
    conn.close().await?;

    info!(rows_inserted, db = %store.path().display(), "Loaded customers");
    Ok(LoadReport {
        rows_inserted,
        ignored_columns,
    })
}

/// Converts a CSV field to the column's storage class, keeping text when it does
/// not parse, the way SQLite type affinity does.
fn coerce(raw: Option<&str>, ty: ColumnType) -> Cell {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Cell::Null;
    };
    match ty {
        ColumnType::Text => Cell::Text(raw.to_string()),
        ColumnType::Integer => {
            if let Ok(v) = raw.trim().parse::<i64>() {
                Cell::Integer(v)
            } else if raw.eq_ignore_ascii_case("true") {
                Cell::Integer(1)
            } else if raw.eq_ignore_ascii_case("false") {
                Cell::Integer(0)
            } else {
                Cell::Text(raw.to_string())
            }
        }
        ColumnType::Real => raw
            .trim()
            .parse::<f64>()
            .map(Cell::Real)
            .unwrap_or_else(|_| Cell::Text(raw.to_string())),
    }
}

/// Splits RFC 4180 CSV text into records of fields.
pub fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, StoreError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
                line += 1;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(StoreError::Csv {
            line,
            reason: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    debug!(records = records.len(), "Parsed CSV");
    Ok(records)
}
