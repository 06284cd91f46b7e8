//! `finetl status`: what the next run would do, without calling the API.

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::config::Config;
use crate::db;
use crate::pipeline::{plan_run, RunPlan};

pub async fn run_status(config: &Config, today: NaiveDate) -> Result<()> {
    let warehouse = db::connect(config).await?;
    let table = &config.db.table;

    let columns = warehouse
        .columns(table)
        .await
        .with_context(|| format!("Failed to read columns of {table}"))?;
    if columns.is_empty() {
        warehouse.close().await;
        println!("{:<14} {} (missing, run `finetl init`)", "TABLE", table);
        return Ok(());
    }

    let rows = warehouse.row_count(table).await;
    let plan = plan_run(config, warehouse.as_ref(), today).await;
    warehouse.close().await;

    println!("{:<14} {}", "BACKEND", warehouse.backend());
    println!("{:<14} {}", "TABLE", table);
    println!("{:<14} {}", "COLUMNS", columns.len());
    println!("{:<14} {}", "ROWS", rows?);
    print_plan(&plan?);
    Ok(())
}

/// Watermark and next window lines, shared with `finetl run --dry-run`.
pub fn print_plan(plan: &RunPlan) {
    println!("{:<14} {}", "WATERMARK", plan.watermark);
    match &plan.window {
        Some(window) => {
            println!("{:<14} {}", "NEXT WINDOW", window);
            println!("{:<14} dateFrom={} dateTo={}", "", window.from_param(), window.to_param());
        }
        None => println!("{:<14} none (up to date)", "NEXT WINDOW"),
    }
}
