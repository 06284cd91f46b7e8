//! The scheduled job: one pipeline run wrapped in connection handling and
//! operator notification.
//!
//! Every non-dry run ends in exactly one notification. A run counts as a
//! failure when any stage returned an error **or** pagination stopped early,
//! even though the records fetched before the failure were loaded.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;

use crate::config::Config;
use crate::db;
use crate::fetch::ReportSource;
use crate::notify::{create_notifier, Notifier};
use crate::pipeline::{plan_run, run_pipeline, RunOutcome, RunPlan, RunReport};
use crate::report_api::HttpReportSource;
use crate::warehouse::Warehouse;

/// Subject and body sent to the operator for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMessage {
    pub success: bool,
    pub subject: String,
    pub body: String,
}

impl RunMessage {
    pub fn success(subject: &str) -> Self {
        Self {
            success: true,
            subject: format!("{subject} - Successful"),
            body: format!("{subject} script completed. No errors detected."),
        }
    }

    pub fn failure(subject: &str, error: &dyn std::fmt::Display) -> Self {
        Self {
            success: false,
            subject: format!("{subject} - Error"),
            body: format!(
                "{subject} script failed. Please check the logs.\nError details: {error}"
            ),
        }
    }

    /// Message for a run that returned a report. A partial fetch is a failure.
    fn for_report(subject: &str, report: &RunReport) -> Self {
        match &report.fetch_error {
            Some(e) => Self::failure(
                subject,
                &format!(
                    "fetch aborted after {} pages ({} rows loaded): {e}",
                    report.pages,
                    report.rows_appended()
                ),
            ),
            None => Self::success(subject),
        }
    }
}

/// Run the pipeline against already constructed collaborators and notify.
///
/// Returns the report for a clean run. A partial fetch and every stage error
/// come back as `Err` after the failure notification went out.
pub async fn run_with(
    config: &Config,
    warehouse: &dyn Warehouse,
    source: &dyn ReportSource,
    notifier: &dyn Notifier,
    today: NaiveDate,
) -> Result<RunReport> {
    let subject = &config.notify.subject;
    match run_pipeline(config, warehouse, source, today).await {
        Ok(report) => {
            let message = RunMessage::for_report(subject, &report);
            deliver(notifier, &message).await;
            log_summary(&report);
            match report.fetch_error {
                Some(e) => Err(anyhow!(e).context("Fetch did not complete")),
                None => Ok(report),
            }
        }
        Err(e) => {
            log::error!("Run failed: {e}");
            deliver(notifier, &RunMessage::failure(subject, &e)).await;
            Err(e.into())
        }
    }
}

/// `finetl run`: connect, fetch, load, notify.
pub async fn run_job(config: &Config, today: NaiveDate) -> Result<RunReport> {
    let notifier = create_notifier(&config.notify)?;

    let warehouse = match db::connect(config).await {
        Ok(wh) => wh,
        Err(e) => {
            log::error!("Run failed: {e:#}");
            deliver(
                notifier.as_ref(),
                &RunMessage::failure(&config.notify.subject, &format!("{e:#}")),
            )
            .await;
            return Err(e);
        }
    };
    log::info!("Connected to {} warehouse", warehouse.backend());

    let source = config
        .api_token()
        .and_then(|token| HttpReportSource::new(&config.api, token).map_err(anyhow::Error::from));
    let result = match source {
        Ok(source) => run_with(config, warehouse.as_ref(), &source, notifier.as_ref(), today).await,
        Err(e) => {
            log::error!("Run failed: {e:#}");
            deliver(
                notifier.as_ref(),
                &RunMessage::failure(&config.notify.subject, &format!("{e:#}")),
            )
            .await;
            Err(e)
        }
    };

    warehouse.close().await;
    result
}

/// `finetl run --dry-run`: resolve the watermark and window, fetch nothing.
pub async fn dry_run(config: &Config, today: NaiveDate) -> Result<RunPlan> {
    let warehouse = db::connect(config).await?;
    let plan = plan_run(config, warehouse.as_ref(), today)
        .await
        .context("Failed to plan run");
    warehouse.close().await;
    plan
}

async fn deliver(notifier: &dyn Notifier, message: &RunMessage) {
    let sent = if message.success {
        notifier.notify_success(&message.subject, &message.body).await
    } else {
        notifier.notify_failure(&message.subject, &message.body).await
    };
    if let Err(e) = sent {
        log::error!("Failed to send notification '{}': {e:#}", message.subject);
    }
}

fn log_summary(report: &RunReport) {
    match &report.outcome {
        RunOutcome::NothingToFetch => log::info!("Nothing to fetch"),
        RunOutcome::NoData => log::info!("No data returned after {} pages", report.pages),
        RunOutcome::Loaded(load) => log::info!(
            "Loaded {} rows in {} pages ({} new columns)",
            load.rows_appended,
            report.pages,
            load.columns_added.len()
        ),
    }
}
