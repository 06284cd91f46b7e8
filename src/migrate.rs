use anyhow::{Context, Result};

use crate::config::Config;
use crate::db;

/// Create the target table with its date column if it does not exist yet.
///
/// Every other column is added by the loader the first time a record carries
/// it, so this is the only DDL an operator ever has to run. Idempotent.
pub async fn run_init(config: &Config) -> Result<bool> {
    let warehouse = db::connect(config).await?;

    let created = warehouse
        .ensure_table(&config.db.table, &config.db.date_column)
        .await
        .with_context(|| format!("Failed to create table {}", config.db.table));

    warehouse.close().await;
    let created = created?;
    if created {
        log::info!(
            "Created {} ({}) on {}",
            config.db.table,
            config.db.date_column,
            warehouse.backend()
        );
    }
    Ok(created)
}
