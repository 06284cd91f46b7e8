//! # Finance Report ETL CLI (`finetl`)
//!
//! ## Usage
//!
//! ```bash
//! finetl --config ./config/finetl.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `finetl init` | Create the target table with its date column |
//! | `finetl status` | Show watermark, next window, columns and rows |
//! | `finetl run` | Fetch the next window, load it, notify the operator |
//! | `finetl run --dry-run` | Resolve watermark and window only |
//!
//! ## Examples
//!
//! ```bash
//! # Weekly cron entry
//! 0 6 * * 1  finetl --config /etc/finetl.toml run
//!
//! # Replay what a Monday run would have fetched
//! finetl run --dry-run --today 2025-10-13
//! ```

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use finance_report_etl::{config, job, logging, migrate, status, window};

/// Incremental loader for weekly seller finance reports.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/finetl.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "finetl",
    about = "Incremental extract-load of weekly finance reports into a SQL table",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/finetl.toml")]
    config: PathBuf,

    /// Only log warnings and errors.
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Log debug output (each request's parameters).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the target table if it does not exist.
    ///
    /// Only the date column is created; every other column is added by the
    /// loader when a record first carries it. Safe to run repeatedly.
    Init,

    /// Print the watermark and the window the next run would fetch.
    Status {
        /// Pretend today is this date (YYYY-MM-DD).
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Fetch the next window and append it to the target table.
    ///
    /// Sends a success or failure notification when it finishes. Exits
    /// non-zero on any failure, including a fetch that stopped early.
    Run {
        /// Pretend today is this date (YYYY-MM-DD).
        #[arg(long)]
        today: Option<NaiveDate>,

        /// Resolve watermark and window, then stop without calling the API.
        #[arg(long)]
        dry_run: bool,
    },
}

fn today_or_now(today: Option<NaiveDate>) -> NaiveDate {
    today.unwrap_or_else(window::local_today)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.quiet, cli.debug);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            if migrate::run_init(&cfg).await? {
                println!("Table {} created.", cfg.db.table);
            } else {
                println!("Table {} already exists.", cfg.db.table);
            }
        }
        Commands::Status { today } => {
            status::run_status(&cfg, today_or_now(today)).await?;
        }
        Commands::Run { today, dry_run } => {
            let today = today_or_now(today);
            if dry_run {
                let plan = job::dry_run(&cfg, today).await?;
                status::print_plan(&plan);
            } else {
                let report = job::run_job(&cfg, today)
                    .await
                    .context("Finance report run failed")?;
                println!("Appended {} rows.", report.rows_appended());
            }
        }
    }

    Ok(())
}
