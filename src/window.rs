//! Fetch-window calculation.
//!
//! Reports are published per ISO week, so a run always asks for whole weeks:
//! from the Monday after the watermark up to the last Sunday that is already
//! over.

use chrono::{Datelike, Duration, NaiveDate};

use crate::error::EtlError;
use crate::models::{FetchWindow, Watermark};

/// Compute the window for the next run.
///
/// - No watermark: start at `default_start`.
/// - Watermark `w`: start at the Monday strictly after `w`.
///
/// The end is always the last completed Sunday before `today`. An inverted
/// window yields [`EtlError::EmptyWindow`]; callers treat that as "nothing to
/// fetch" rather than a failure.
pub fn compute_window(
    watermark: Watermark,
    today: NaiveDate,
    default_start: NaiveDate,
) -> Result<FetchWindow, EtlError> {
    let date_from = match watermark.0 {
        Some(w) => next_monday_after(w.date()),
        None => default_start,
    };
    let date_to = last_completed_sunday(today);

    if date_from > date_to {
        return Err(EtlError::EmptyWindow {
            from: date_from,
            to: date_to,
        });
    }

    Ok(FetchWindow { date_from, date_to })
}

/// Monday of the week following `date`'s week.
pub fn next_monday_after(date: NaiveDate) -> NaiveDate {
    let offset = i64::from(date.weekday().num_days_from_monday());
    date - Duration::days(offset) + Duration::days(7)
}

/// Calendar date on the host's local clock.
///
/// Weeks end at local midnight: a Monday-morning cron run east of UTC must
/// already see the Sunday that just ended.
pub fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Most recent Sunday strictly before `today`.
pub fn last_completed_sunday(today: NaiveDate) -> NaiveDate {
    let offset = i64::from(today.weekday().num_days_from_monday());
    today - Duration::days(offset + 1)
}
