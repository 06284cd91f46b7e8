//! Relational store abstraction.
//!
//! The pipeline only needs a few things from the destination database: the
//! maximum of the date column, the current column list, adding a text column,
//! appending rows, plus table creation and a row count for `finetl init` and
//! `finetl status`. The [`Warehouse`] trait captures exactly that, with one
//! implementation per supported backend:
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | PostgreSQL | [`crate::warehouse_pg`] | production reporting database |
//! | SQLite | [`crate::warehouse_sqlite`] | local runs and tests |
//!
//! Use [`crate::db::connect`] to get the right one for a URL.

use async_trait::async_trait;

use crate::error::EtlError;
use crate::models::{ColumnInfo, Record};

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Short backend name for logs (`"postgres"`, `"sqlite"`).
    fn backend(&self) -> &'static str;

    /// `MAX(column)` rendered as text, or `None` when the table has no rows.
    async fn max_value(&self, table: &str, column: &str) -> Result<Option<String>, EtlError>;

    async fn row_count(&self, table: &str) -> Result<i64, EtlError>;

    /// Columns of `table` in ordinal order. Empty when the table does not exist.
    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, EtlError>;

    /// `ALTER TABLE … ADD COLUMN "<column>" TEXT`.
    async fn add_text_column(&self, table: &str, column: &str) -> Result<(), EtlError>;

    /// Append `records` as new rows, writing only `columns`. Runs in one
    /// transaction. Returns the number of rows inserted.
    async fn append(
        &self,
        table: &str,
        columns: &[ColumnInfo],
        records: &[Record],
    ) -> Result<u64, EtlError>;

    /// Create `table` with a single date column if it does not exist yet.
    /// Returns `true` when the table was created.
    async fn ensure_table(&self, table: &str, date_column: &str) -> Result<bool, EtlError>;

    async fn close(&self);
}

/// Double-quote an identifier, doubling embedded quotes. Valid for both
/// PostgreSQL and SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a JSON scalar the way it is bound into a text parameter.
///
/// Nested arrays and objects are stored as their JSON text.
pub fn value_as_text(value: &serde_json::Value) -> Option<String> {
    use serde_json::Value;
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// How many rows fit in one multi-row `INSERT` without exceeding `max_binds`.
pub fn rows_per_statement(column_count: usize, max_binds: usize) -> usize {
    if column_count == 0 {
        return 1;
    }
    (max_binds / column_count).max(1)
}
