//! Schema-evolving load into the target table.
//!
//! Loading is two separate steps that are not wrapped in one transaction:
//!
//! 1. **Reconcile**: every field seen in the records but missing from the
//!    table is added as a `TEXT` column. Existing columns are never altered.
//! 2. **Append**: all records are inserted as new rows in one transaction.
//!
//! A crash between the two leaves extra empty columns behind, which the next
//! run simply reuses.

use std::collections::HashSet;

use crate::error::EtlError;
use crate::models::{ColumnInfo, RecordSet};
use crate::warehouse::Warehouse;

/// Result of diffing incoming fields against the table's columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaPlan {
    /// Fields to add, in order of first appearance in the records.
    pub missing: Vec<String>,
    /// Every field the records carry, in order of first appearance.
    pub fields: Vec<String>,
}

impl SchemaPlan {
    pub fn is_noop(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Fields present in `records` but absent from `existing`.
///
/// Matching is exact (case-sensitive), the same way the columns were created.
pub fn plan_schema(existing: &[ColumnInfo], records: &RecordSet) -> SchemaPlan {
    let fields = records.field_names();
    let known: HashSet<&str> = existing.iter().map(|c| c.name.as_str()).collect();
    let missing = fields
        .iter()
        .filter(|f| !known.contains(f.as_str()))
        .cloned()
        .collect();
    SchemaPlan { missing, fields }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub rows_appended: u64,
    pub columns_added: Vec<String>,
}

/// Reconcile the table's schema with `records`, then append them.
pub async fn load_records(
    warehouse: &dyn Warehouse,
    table: &str,
    records: &RecordSet,
) -> Result<LoadReport, EtlError> {
    let existing = warehouse.columns(table).await?;
    if existing.is_empty() {
        return Err(EtlError::SchemaMismatch {
            table: table.to_string(),
            detail: "table does not exist (run `finetl init` first)".to_string(),
            source: None,
        });
    }
    log::info!("{table} has {} columns", existing.len());

    let plan = plan_schema(&existing, records);
    if !plan.is_noop() {
        log::info!("New columns to add: {:?}", plan.missing);
        for column in &plan.missing {
            warehouse.add_text_column(table, column).await?;
            log::info!("Added column {column} TEXT");
        }
    }

    // Re-read so newly added columns carry the backend's own type name.
    let columns = if plan.is_noop() {
        existing
    } else {
        warehouse.columns(table).await?
    };
    let wanted: HashSet<&str> = plan.fields.iter().map(String::as_str).collect();
    let targets: Vec<ColumnInfo> = columns
        .into_iter()
        .filter(|c| wanted.contains(c.name.as_str()))
        .collect();

    if targets.len() != plan.fields.len() {
        return Err(EtlError::SchemaMismatch {
            table: table.to_string(),
            detail: format!(
                "expected {} target columns after reconciliation, found {}",
                plan.fields.len(),
                targets.len()
            ),
            source: None,
        });
    }

    let rows_appended = warehouse.append(table, &targets, records.records()).await?;
    log::info!("Appended {rows_appended} rows to {table}");

    Ok(LoadReport {
        rows_appended,
        columns_added: plan.missing,
    })
}
