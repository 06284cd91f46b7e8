use anyhow::{bail, Context, Result};

use crate::config::Config;
use crate::warehouse::Warehouse;
use crate::warehouse_pg::PgWarehouse;
use crate::warehouse_sqlite::SqliteWarehouse;

/// Open the warehouse named by the configured database URL.
///
/// `postgres://` / `postgresql://` URLs select PostgreSQL, `sqlite:` URLs
/// select SQLite (the parent directory of a file database is created).
pub async fn connect(config: &Config) -> Result<Box<dyn Warehouse>> {
    let url = config.database_url()?;
    let max_connections = config.db.max_connections;

    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        let wh = PgWarehouse::connect(&url, max_connections)
            .await
            .context("Failed to connect to PostgreSQL")?;
        return Ok(Box::new(wh));
    }

    if let Some(path) = url.strip_prefix("sqlite:") {
        let path = path.trim_start_matches("//");
        let path = path.split('?').next().unwrap_or(path);
        // Ensure parent directory exists
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !path.starts_with(":memory:") {
                std::fs::create_dir_all(parent)?;
            }
        }
        let wh = SqliteWarehouse::connect(&url, max_connections)
            .await
            .context("Failed to open SQLite database")?;
        return Ok(Box::new(wh));
    }

    bail!("Unsupported database URL scheme (expected postgres:// or sqlite:)");
}
