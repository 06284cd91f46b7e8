//! Rate-limited cursor pagination over the report API.
//!
//! A [`Paginator`] walks one [`FetchWindow`] page by page. The cursor lives in
//! the paginator's state, never in captured closures, and every transition is
//! explicit:
//!
//! ```text
//!            full page (cursor advances)
//!            ┌──────────┐
//!            ▼          │
//!       ┌──────────┐────┘     short page     ┌──────────┐
//!  ────▶│ Fetching │───────────────────────▶│ LastPage │
//!       └──────────┘                        └──────────┘
//!         │      │        zero records      ┌───────────┐
//!         │      └─────────────────────────▶│ EmptyPage │
//!         │                                 └───────────┘
//!         │  transport / HTTP / decode error ┌────────┐
//!         └─────────────────────────────────▶│ Failed │
//!                                            └────────┘
//! ```
//!
//! The three terminal states end the sequence for good: a paginator cannot be
//! rewound, and a new run needs a new paginator.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::EtlError;
use crate::models::{FetchWindow, Record, RecordBatch};

/// Cursor value meaning "from the start of the window".
pub const INITIAL_CURSOR: i64 = 0;

/// Parameters of one page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub window: FetchWindow,
    pub limit: usize,
    pub cursor: i64,
}

/// Anything that can answer a page request: the HTTP API in production
/// ([`crate::report_api::HttpReportSource`]), a scripted source in tests.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Record>, EtlError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Fetching { cursor: i64 },
    LastPage,
    EmptyPage,
    Failed,
}

impl FetchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Fetching { .. })
    }
}

/// Pagination settings shared by every page of a run.
#[derive(Debug, Clone)]
pub struct PageSettings {
    /// Records per page; a shorter page is the last one.
    pub limit: usize,
    /// Wait before every request, including the first.
    pub interval: Duration,
    /// Record field holding the source sequence id used as the next cursor.
    pub cursor_field: String,
}

pub struct Paginator<'a> {
    source: &'a dyn ReportSource,
    window: FetchWindow,
    settings: PageSettings,
    state: FetchState,
    pages: usize,
    /// Cursor error found on a page that was itself delivered; yielded next.
    pending: Option<EtlError>,
}

impl<'a> Paginator<'a> {
    pub fn new(source: &'a dyn ReportSource, window: FetchWindow, settings: PageSettings) -> Self {
        Self {
            source,
            window,
            settings,
            state: FetchState::Fetching {
                cursor: INITIAL_CURSOR,
            },
            pages: 0,
            pending: None,
        }
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    /// Number of page requests issued so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Request the next page.
    ///
    /// Yields `Some(Ok(batch))` for every page received (including a final
    /// empty one), `Some(Err(_))` once if pagination fails, and `None` from
    /// then on. A full page whose cursor is unusable is still yielded; the
    /// error follows on the next call.
    pub async fn next_batch(&mut self) -> Option<Result<RecordBatch, EtlError>> {
        if let Some(e) = self.pending.take() {
            return Some(Err(e));
        }
        let cursor = match self.state {
            FetchState::Fetching { cursor } => cursor,
            _ => return None,
        };

        if !self.settings.interval.is_zero() {
            log::info!(
                "Waiting {}s for the API rate limit (request {})",
                self.settings.interval.as_secs(),
                self.pages + 1
            );
            tokio::time::sleep(self.settings.interval).await;
        }

        let request = PageRequest {
            window: self.window,
            limit: self.settings.limit,
            cursor,
        };
        self.pages += 1;

        let records = match self.source.fetch_page(&request).await {
            Ok(records) => records,
            Err(e) => {
                log::error!("Page {} (cursor {cursor}) failed: {e}", self.pages);
                self.state = FetchState::Failed;
                return Some(Err(e));
            }
        };
        log::info!(
            "Page {} (cursor {cursor}): {} records",
            self.pages,
            records.len()
        );

        if records.is_empty() {
            log::info!("No more records in {}", self.window);
            self.state = FetchState::EmptyPage;
        } else if records.len() < self.settings.limit {
            log::info!("Short page, pagination finished");
            self.state = FetchState::LastPage;
        } else {
            match next_cursor(&records, &self.settings.cursor_field, cursor) {
                Ok(next) => self.state = FetchState::Fetching { cursor: next },
                Err(e) => {
                    log::error!(
                        "Page {} (cursor {cursor}) has no usable next cursor: {e}",
                        self.pages
                    );
                    self.state = FetchState::Failed;
                    self.pending = Some(e);
                }
            }
        }

        Some(Ok(RecordBatch { cursor, records }))
    }
}

/// Cursor for the page after a full one: the last record's sequence id.
///
/// The id must be an integer strictly greater than the current cursor,
/// otherwise the same page would be requested forever.
fn next_cursor(records: &[Record], field: &str, current: i64) -> Result<i64, EtlError> {
    let last = records
        .last()
        .ok_or_else(|| EtlError::Decode("full page without records".to_string()))?;
    let value = last
        .get(field)
        .ok_or_else(|| EtlError::Decode(format!("last record has no '{field}' field")))?;
    let next = value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| EtlError::Decode(format!("'{field}' is not an integer: {value}")))?;

    if next <= current {
        return Err(EtlError::Decode(format!(
            "cursor did not advance ({field} {next} after {current})"
        )));
    }
    Ok(next)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use chrono::NaiveDate;

    fn window() -> FetchWindow {
        FetchWindow {
            date_from: NaiveDate::from_ymd_opt(2025, 9, 29).unwrap(),
            date_to: NaiveDate::from_ymd_opt(2025, 10, 12).unwrap(),
        }
    }

    fn settings(limit: usize) -> PageSettings {
        PageSettings {
            limit,
            interval: Duration::ZERO,
            cursor_field: "rrd_id".to_string(),
        }
    }

    async fn drain(p: &mut Paginator<'_>) -> Vec<Result<RecordBatch, EtlError>> {
        let mut out = Vec::new();
        while let Some(item) = p.next_batch().await {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn two_full_pages_then_short_page() {
        let source = ScriptedSource::new(vec![Ok(page(1, 3)), Ok(page(4, 3)), Ok(page(7, 2))]);
        let mut p = Paginator::new(&source, window(), settings(3));

        let batches = drain(&mut p).await;
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.is_ok()));
        assert_eq!(p.state(), FetchState::LastPage);
        assert_eq!(p.pages(), 3);
        assert_eq!(source.cursors(), vec![0, 3, 6]);
    }

    #[tokio::test]
    async fn cursors_never_decrease() {
        let source = ScriptedSource::new(vec![
            Ok(page(10, 2)),
            Ok(page(12, 2)),
            Ok(page(100, 2)),
            Ok(page(102, 1)),
        ]);
        let mut p = Paginator::new(&source, window(), settings(2));
        let batches = drain(&mut p).await;

        let cursors: Vec<i64> = batches.iter().map(|b| b.as_ref().unwrap().cursor).collect();
        assert_eq!(cursors, vec![0, 11, 13, 101]);
        assert!(cursors.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn empty_first_page_yields_empty_batch_and_stops() {
        let source = ScriptedSource::new(vec![Ok(Vec::new())]);
        let mut p = Paginator::new(&source, window(), settings(3));

        let batches = drain(&mut p).await;
        assert_eq!(batches.len(), 1);
        assert!(batches[0].as_ref().unwrap().is_empty());
        assert_eq!(p.state(), FetchState::EmptyPage);
    }

    #[tokio::test]
    async fn exact_multiple_ends_with_empty_page() {
        let source = ScriptedSource::new(vec![Ok(page(1, 2)), Ok(page(3, 2)), Ok(Vec::new())]);
        let mut p = Paginator::new(&source, window(), settings(2));

        let batches = drain(&mut p).await;
        assert_eq!(batches.len(), 3);
        assert_eq!(p.state(), FetchState::EmptyPage);
    }

    #[tokio::test]
    async fn failure_is_yielded_once_then_sequence_ends() {
        let source = ScriptedSource::new(vec![Ok(page(1, 2)), Err(http_error(500)), Ok(page(3, 2))]);
        let mut p = Paginator::new(&source, window(), settings(2));

        assert!(p.next_batch().await.unwrap().is_ok());
        assert!(matches!(
            p.next_batch().await,
            Some(Err(EtlError::Http { status: Some(500), .. }))
        ));
        assert_eq!(p.state(), FetchState::Failed);
        assert!(p.next_batch().await.is_none());
        assert_eq!(source.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn finished_paginator_issues_no_more_requests() {
        let source = ScriptedSource::new(vec![Ok(page(1, 1))]);
        let mut p = Paginator::new(&source, window(), settings(5));

        drain(&mut p).await;
        assert!(p.next_batch().await.is_none());
        assert!(p.next_batch().await.is_none());
        assert_eq!(source.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_cursor_field_fails() {
        let mut records = page(1, 2);
        records[1].remove("rrd_id");
        let source = ScriptedSource::new(vec![Ok(records)]);
        let mut p = Paginator::new(&source, window(), settings(2));

        let batch = p.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(p.state(), FetchState::Failed);
        assert!(matches!(p.next_batch().await, Some(Err(EtlError::Decode(_)))));
        assert!(p.next_batch().await.is_none());
        assert_eq!(source.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn stalled_cursor_fails_instead_of_looping() {
        let source = ScriptedSource::new(vec![Ok(page(1, 2)), Ok(page(1, 2))]);
        let mut p = Paginator::new(&source, window(), settings(2));

        let batches = drain(&mut p).await;
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].as_ref().unwrap().len(), 2);
        assert!(batches[2].is_err());
        assert_eq!(source.cursors(), vec![0, 2]);
    }

    #[test]
    fn string_cursor_is_accepted() {
        let mut records = page(1, 1);
        records[0].insert("rrd_id".to_string(), serde_json::json!("41"));
        assert_eq!(next_cursor(&records, "rrd_id", 0).unwrap(), 41);
    }

    #[tokio::test]
    async fn request_carries_window_and_limit() {
        let source = ScriptedSource::new(vec![Ok(Vec::new())]);
        let mut p = Paginator::new(&source, window(), settings(10_000));
        drain(&mut p).await;

        let requests = source.requests.lock().unwrap();
        assert_eq!(
            requests[0],
            PageRequest {
                window: window(),
                limit: 10_000,
                cursor: 0
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn waits_the_rate_limit_interval_before_every_request() {
        let source = ScriptedSource::new(vec![Ok(page(1, 2)), Ok(page(3, 2)), Ok(page(5, 1))]);
        let mut p = Paginator::new(
            &source,
            window(),
            PageSettings {
                interval: Duration::from_secs(61),
                ..settings(2)
            },
        );

        let started = tokio::time::Instant::now();
        drain(&mut p).await;
        assert_eq!(p.pages(), 3);
        assert!(started.elapsed() >= Duration::from_secs(3 * 61));
        assert!(started.elapsed() < Duration::from_secs(4 * 61));
    }
}
