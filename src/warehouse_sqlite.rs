//! SQLite warehouse backend, used for local runs and the test-suite.
//!
//! SQLite's column affinity converts bound text into the declared storage
//! class, so values are bound as text without casts.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;

use crate::error::EtlError;
use crate::models::{ColumnInfo, Record};
use crate::warehouse::{quote_ident, rows_per_statement, value_as_text, Warehouse};

/// Default `SQLITE_MAX_VARIABLE_NUMBER` for SQLite >= 3.32.
const MAX_BIND_PARAMS: usize = 32_766;

#[derive(Clone)]
pub struct SqliteWarehouse {
    pool: SqlitePool,
}

impl SqliteWarehouse {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, EtlError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| EtlError::connectivity("parsing SQLite URL", e))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| EtlError::connectivity("opening SQLite database", e))?;

        Ok(Self { pool })
    }

    /// Open (or create) a database file.
    pub async fn open(path: &Path) -> Result<Self, EtlError> {
        Self::connect(&format!("sqlite:{}", path.display()), 1).await
    }
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn max_value(&self, table: &str, column: &str) -> Result<Option<String>, EtlError> {
        let sql = format!(
            "SELECT CAST(MAX({}) AS TEXT) FROM {}",
            quote_ident(column),
            quote_ident(table)
        );
        sqlx::query_scalar::<_, Option<String>>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EtlError::connectivity(format!("reading MAX({column}) from {table}"), e))
    }

    async fn row_count(&self, table: &str) -> Result<i64, EtlError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        sqlx::query_scalar::<_, i64>(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EtlError::connectivity(format!("counting rows of {table}"), e))
    }

    async fn columns(&self, table: &str) -> Result<Vec<ColumnInfo>, EtlError> {
        let rows = sqlx::query("SELECT name, type FROM pragma_table_info(?) ORDER BY cid")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EtlError::connectivity(format!("listing columns of {table}"), e))?;

        rows.iter()
            .map(|row| -> Result<ColumnInfo, sqlx::Error> {
                Ok(ColumnInfo {
                    name: row.try_get("name")?,
                    data_type: row.try_get("type")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(|e| EtlError::connectivity(format!("decoding columns of {table}"), e))
    }

    async fn add_text_column(&self, table: &str, column: &str) -> Result<(), EtlError> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} TEXT",
            quote_ident(table),
            quote_ident(column)
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| EtlError::schema(table, format!("adding column '{column}'"), e))?;
        Ok(())
    }

    async fn append(
        &self,
        table: &str,
        columns: &[ColumnInfo],
        records: &[Record],
    ) -> Result<u64, EtlError> {
        if records.is_empty() || columns.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::schema(table, "starting insert transaction", e))?;

        let mut inserted = 0u64;
        for chunk in records.chunks(rows_per_statement(columns.len(), MAX_BIND_PARAMS)) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO {} (", quote_ident(table)));
            {
                let mut names = qb.separated(", ");
                for column in columns {
                    names.push(quote_ident(&column.name));
                }
            }
            qb.push(") ");
            qb.push_values(chunk, |mut row, record| {
                for column in columns {
                    row.push_bind(record.get(&column.name).and_then(value_as_text));
                }
            });

            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| EtlError::schema(table, "appending rows", e))?;
            inserted += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| EtlError::schema(table, "committing appended rows", e))?;
        Ok(inserted)
    }

    async fn ensure_table(&self, table: &str, date_column: &str) -> Result<bool, EtlError> {
        if !self.columns(table).await?.is_empty() {
            return Ok(false);
        }
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({} TEXT)",
            quote_ident(table),
            quote_ident(date_column)
        );
        sqlx::query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| EtlError::schema(table, "creating table", e))?;
        Ok(true)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(v: serde_json::Value) -> Record {
        v.as_object().unwrap().clone()
    }

    async fn open_temp() -> (TempDir, SqliteWarehouse) {
        let tmp = TempDir::new().unwrap();
        let wh = SqliteWarehouse::open(&tmp.path().join("wh.sqlite"))
            .await
            .unwrap();
        (tmp, wh)
    }

    #[tokio::test]
    async fn missing_table_has_no_columns() {
        let (_tmp, wh) = open_temp().await;
        assert!(wh.columns("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ensure_table_is_idempotent() {
        let (_tmp, wh) = open_temp().await;
        assert!(wh.ensure_table("reports", "date_to").await.unwrap());
        assert!(!wh.ensure_table("reports", "date_to").await.unwrap());

        let columns = wh.columns("reports").await.unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "date_to");
    }

    #[tokio::test]
    async fn max_value_of_empty_table_is_none() {
        let (_tmp, wh) = open_temp().await;
        wh.ensure_table("reports", "date_to").await.unwrap();
        assert_eq!(wh.max_value("reports", "date_to").await.unwrap(), None);
    }

    #[tokio::test]
    async fn max_value_on_missing_table_is_connectivity_error() {
        let (_tmp, wh) = open_temp().await;
        let err = wh.max_value("nope", "date_to").await.unwrap_err();
        assert!(matches!(err, EtlError::Connectivity { .. }));
    }

    #[tokio::test]
    async fn append_writes_nulls_for_absent_fields() {
        let (_tmp, wh) = open_temp().await;
        wh.ensure_table("reports", "date_to").await.unwrap();
        wh.add_text_column("reports", "rrd_id").await.unwrap();
        let columns = wh.columns("reports").await.unwrap();

        let rows = vec![
            record(json!({"date_to": "2025-09-28", "rrd_id": 7})),
            record(json!({"date_to": "2025-10-05"})),
        ];
        assert_eq!(wh.append("reports", &columns, &rows).await.unwrap(), 2);

        let nulls: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM reports WHERE rrd_id IS NULL")
                .fetch_one(&wh.pool)
                .await
                .unwrap();
        assert_eq!(nulls, 1);
        assert_eq!(
            wh.max_value("reports", "date_to").await.unwrap().as_deref(),
            Some("2025-10-05")
        );
    }

    #[tokio::test]
    async fn append_spans_multiple_statements() {
        let (_tmp, wh) = open_temp().await;
        wh.ensure_table("wide", "date_to").await.unwrap();
        for i in 0..99 {
            wh.add_text_column("wide", &format!("f{i}")).await.unwrap();
        }
        let columns = wh.columns("wide").await.unwrap();
        assert_eq!(columns.len(), 100);

        // 100 columns => 327 rows per statement; 1000 rows need four statements.
        let rows: Vec<Record> = (0..1000)
            .map(|i| record(json!({"date_to": format!("2025-01-{:02}", i % 28 + 1)})))
            .collect();
        assert_eq!(wh.append("wide", &columns, &rows).await.unwrap(), 1000);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM wide")
            .fetch_one(&wh.pool)
            .await
            .unwrap();
        assert_eq!(count, 1000);
    }

    #[tokio::test]
    async fn duplicate_column_is_schema_error() {
        let (_tmp, wh) = open_temp().await;
        wh.ensure_table("reports", "date_to").await.unwrap();
        let err = wh.add_text_column("reports", "date_to").await.unwrap_err();
        assert!(matches!(err, EtlError::SchemaMismatch { .. }));
    }
}
