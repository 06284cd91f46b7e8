//! PostgreSQL warehouse backend.
//!
//! Column types are read from `pg_attribute` so every bound text value can be
//! cast to the declared column type. That keeps appends working on tables
//! whose pre-existing columns were created with numeric, boolean or timestamp
//! types, while columns added by this pipeline are plain `TEXT`.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Row};

use crate::error::EtlError;
use crate::models::{ColumnInfo, Record};
use crate::warehouse::{quote_ident, rows_per_statement, value_as_text, Warehouse};

/// PostgreSQL caps a statement at 65535 bind parameters.
const MAX_BIND_PARAMS: usize = 65_535;

const COLUMNS_SQL: &str = r#"
    SELECT a.attname::text AS name,
           format_type(a.atttypid, a.atttypmod) AS data_type
    FROM pg_catalog.pg_attribute a
    WHERE a.attrelid = to_regclass(quote_ident($1))
      AND a.attnum > 0
      AND NOT a.attisdropped
    ORDER BY a.attnum
"#;

#[derive(Clone)]
pub struct PgWarehouse {
    pool: PgPool,
}

impl PgWarehouse {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, EtlError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| EtlError::connectivity("connecting to PostgreSQL", e))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    fn backend(&self) -> &'static str {
        "postgres"
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
        let rows = sqlx::query(COLUMNS_SQL)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EtlError::connectivity(format!("listing columns of {table}"), e))?;

        rows.iter()
            .map(|row| -> Result<ColumnInfo, sqlx::Error> {
                Ok(ColumnInfo {
                    name: row.try_get("name")?,
                    data_type: row.try_get("data_type")?,
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
            let mut qb: QueryBuilder<Postgres> =
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
                    row.push_bind(record.get(&column.name).and_then(value_as_text))
                        .push_unseparated(format!("::{}", column.data_type));
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
            "CREATE TABLE IF NOT EXISTS {} ({} TIMESTAMP)",
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
