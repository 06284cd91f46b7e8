//! One incremental run, stage by stage.
//!
//! ```text
//! watermark ──▶ window ──▶ paginate ──▶ accumulate ──▶ load
//!                  │                         │
//!                  └─ inverted: no-op        └─ empty: no-op
//! ```
//!
//! The pipeline is generic over its two collaborators, the [`Warehouse`] and
//! the [`ReportSource`], and knows nothing about notification or process exit
//! codes; that is [`crate::job`]'s business.

use chrono::NaiveDate;

use crate::accumulate::{accumulate, Termination};
use crate::config::Config;
use crate::error::EtlError;
use crate::fetch::{PageSettings, Paginator, ReportSource};
use crate::load::{load_records, LoadReport};
use crate::models::{FetchWindow, Watermark};
use crate::warehouse::Warehouse;
use crate::watermark::resolve_watermark;
use crate::window::compute_window;

/// What a run would fetch, before any request is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    pub watermark: Watermark,
    /// `None` when the computed window is inverted.
    pub window: Option<FetchWindow>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The window was inverted; the API was not called.
    NothingToFetch,
    /// The API returned no records; the table was not touched.
    NoData,
    Loaded(LoadReport),
}

#[derive(Debug)]
pub struct RunReport {
    pub plan: RunPlan,
    /// Page requests issued, including a failed one.
    pub pages: usize,
    pub outcome: RunOutcome,
    /// Set when pagination stopped on an error. Records fetched before it
    /// are still part of `outcome`.
    pub fetch_error: Option<EtlError>,
}

impl RunReport {
    pub fn is_partial(&self) -> bool {
        self.fetch_error.is_some()
    }

    pub fn rows_appended(&self) -> u64 {
        match &self.outcome {
            RunOutcome::Loaded(load) => load.rows_appended,
            _ => 0,
        }
    }
}

/// Resolve the watermark and compute the window for `today`.
pub async fn plan_run(
    config: &Config,
    warehouse: &dyn Warehouse,
    today: NaiveDate,
) -> Result<RunPlan, EtlError> {
    let watermark = resolve_watermark(warehouse, &config.db.table, &config.db.date_column).await?;
    if watermark.is_absent() {
        log::info!(
            "{} is empty, starting at {}",
            config.db.table,
            config.window.default_start
        );
    }

    let window = match compute_window(watermark, today, config.window.default_start) {
        Ok(window) => {
            log::info!("Fetch window: {window}");
            Some(window)
        }
        Err(e) if e.is_noop() => {
            log::info!("No data to fetch: {e}");
            None
        }
        Err(e) => return Err(e),
    };

    Ok(RunPlan { watermark, window })
}

pub fn page_settings(config: &Config) -> PageSettings {
    PageSettings {
        limit: config.api.page_limit,
        interval: config.api.request_interval(),
        cursor_field: config.api.cursor_field.clone(),
    }
}

/// Run every stage once.
///
/// Watermark and load failures are returned as errors. A failed page request
/// is not: the records fetched before it are loaded and the error is handed
/// back in [`RunReport::fetch_error`].
pub async fn run_pipeline(
    config: &Config,
    warehouse: &dyn Warehouse,
    source: &dyn ReportSource,
    today: NaiveDate,
) -> Result<RunReport, EtlError> {
    let plan = plan_run(config, warehouse, today).await?;
    let window = match plan.window {
        Some(window) => window,
        None => {
            return Ok(RunReport {
                plan,
                pages: 0,
                outcome: RunOutcome::NothingToFetch,
                fetch_error: None,
            })
        }
    };

    let paginator = Paginator::new(source, window, page_settings(config));
    let fetched = accumulate(paginator).await;
    let fetch_error = match fetched.termination {
        Termination::Drained => None,
        Termination::Aborted(e) => Some(e),
    };

    if fetched.records.is_empty() {
        log::info!("No records returned for {}", config.db.table);
        return Ok(RunReport {
            plan,
            pages: fetched.pages,
            outcome: RunOutcome::NoData,
            fetch_error,
        });
    }

    if fetch_error.is_some() {
        log::warn!(
            "Loading {} records from an incomplete fetch",
            fetched.records.len()
        );
    }
    let load = load_records(warehouse, &config.db.table, &fetched.records).await?;

    Ok(RunReport {
        plan,
        pages: fetched.pages,
        outcome: RunOutcome::Loaded(load),
        fetch_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::fetch::testing::{http_error, page, ScriptedSource};
    use crate::warehouse_sqlite::SqliteWarehouse;
    use serde_json::json;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
[db]
url = "sqlite::memory:"
table = "reports"

[api]
url = "http://127.0.0.1:9/unused"
page_limit = 3
request_interval_secs = 0
"#;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn warehouse() -> (TempDir, SqliteWarehouse) {
        let tmp = TempDir::new().unwrap();
        let wh = SqliteWarehouse::open(&tmp.path().join("p.sqlite"))
            .await
            .unwrap();
        wh.ensure_table("reports", "date_to").await.unwrap();
        (tmp, wh)
    }

    async fn seed(wh: &SqliteWarehouse, date_to: &str) {
        let columns = wh.columns("reports").await.unwrap();
        let row = json!({ "date_to": date_to }).as_object().unwrap().clone();
        wh.append("reports", &columns, &[row]).await.unwrap();
    }

    #[tokio::test]
    async fn inverted_window_skips_the_api() {
        let config = parse_config(CONFIG).unwrap();
        let (_tmp, wh) = warehouse().await;
        seed(&wh, "2025-10-12").await;
        let source = ScriptedSource::new(vec![]);

        let report = run_pipeline(&config, &wh, &source, date(2025, 10, 15))
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::NothingToFetch);
        assert!(report.plan.window.is_none());
        assert!(source.cursors().is_empty());
    }

    #[tokio::test]
    async fn empty_table_fetches_from_default_start() {
        let config = parse_config(CONFIG).unwrap();
        let (_tmp, wh) = warehouse().await;
        let source = ScriptedSource::new(vec![Ok(page(1, 3)), Ok(page(4, 1))]);

        let report = run_pipeline(&config, &wh, &source, date(2025, 10, 15))
            .await
            .unwrap();

        let window = report.plan.window.unwrap();
        assert_eq!(window.date_from, date(2025, 1, 1));
        assert_eq!(window.date_to, date(2025, 10, 12));
        assert_eq!(report.pages, 2);
        assert_eq!(report.rows_appended(), 4);
        assert!(!report.is_partial());
        assert_eq!(source.cursors(), vec![0, 3]);
    }

    #[tokio::test]
    async fn empty_response_leaves_table_untouched() {
        let config = parse_config(CONFIG).unwrap();
        let (_tmp, wh) = warehouse().await;
        seed(&wh, "2025-09-28").await;
        let before = wh.columns("reports").await.unwrap();
        let source = ScriptedSource::new(vec![Ok(Vec::new())]);

        let report = run_pipeline(&config, &wh, &source, date(2025, 10, 15))
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::NoData);
        assert_eq!(wh.columns("reports").await.unwrap(), before);
        assert_eq!(wh.row_count("reports").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn partial_fetch_is_loaded_and_flagged() {
        let config = parse_config(CONFIG).unwrap();
        let (_tmp, wh) = warehouse().await;
        let source = ScriptedSource::new(vec![Ok(page(1, 3)), Err(http_error(500))]);

        let report = run_pipeline(&config, &wh, &source, date(2025, 10, 15))
            .await
            .unwrap();

        assert!(report.is_partial());
        assert_eq!(report.rows_appended(), 3);
        assert_eq!(wh.row_count("reports").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn failure_on_first_page_loads_nothing() {
        let config = parse_config(CONFIG).unwrap();
        let (_tmp, wh) = warehouse().await;
        let source = ScriptedSource::new(vec![Err(http_error(401))]);

        let report = run_pipeline(&config, &wh, &source, date(2025, 10, 15))
            .await
            .unwrap();

        assert_eq!(report.outcome, RunOutcome::NoData);
        assert!(report.is_partial());
        assert_eq!(wh.row_count("reports").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_table_is_fatal() {
        let config = parse_config(CONFIG).unwrap();
        let tmp = TempDir::new().unwrap();
        let wh = SqliteWarehouse::open(&tmp.path().join("bare.sqlite"))
            .await
            .unwrap();
        let source = ScriptedSource::new(vec![]);

        let err = run_pipeline(&config, &wh, &source, date(2025, 10, 15))
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::Connectivity { .. }));
    }
}
