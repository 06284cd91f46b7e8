//! Watermark resolution.
//!
//! The watermark is the latest value of the configured date column. It is
//! never stored separately: appending rows with later dates is what moves it.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::EtlError;
use crate::models::Watermark;
use crate::warehouse::Warehouse;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Read `MAX(date_column)` from `table`.
///
/// Returns [`Watermark::absent`] when the table has no rows. Database errors
/// are fatal for the run and are never replaced by a default.
pub async fn resolve_watermark(
    warehouse: &dyn Warehouse,
    table: &str,
    date_column: &str,
) -> Result<Watermark, EtlError> {
    let raw = warehouse.max_value(table, date_column).await?;
    let watermark = match raw {
        Some(value) => Watermark(Some(parse_timestamp(&value)?)),
        None => Watermark::absent(),
    };
    log::info!("Last {date_column} in {table}: {watermark}");
    Ok(watermark)
}

/// Parse a stored date/timestamp rendered as text.
///
/// Accepts RFC 3339 (offset is dropped after converting to UTC), the
/// PostgreSQL `timestamp` text form, ISO-8601 with `T`, and plain dates.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, EtlError> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.naive_utc());
    }
    // PostgreSQL renders timestamptz as "2025-09-28 00:00:00+00"
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(dt.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(ts);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN));
    }

    Err(EtlError::Watermark(format!(
        "'{value}' is not a recognizable date or timestamp"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use crate::warehouse_sqlite::SqliteWarehouse;
    use serde_json::json;
    use tempfile::TempDir;

    fn ts(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn parses_rfc3339() {
        assert_eq!(
            parse_timestamp("2025-09-28T00:00:00Z").unwrap(),
            ts(2025, 9, 28, 0, 0, 0)
        );
        assert_eq!(
            parse_timestamp("2025-09-28T03:00:00+03:00").unwrap(),
            ts(2025, 9, 28, 0, 0, 0)
        );
    }

    #[test]
    fn parses_postgres_timestamp_text() {
        assert_eq!(
            parse_timestamp("2025-09-28 00:00:00").unwrap(),
            ts(2025, 9, 28, 0, 0, 0)
        );
        assert_eq!(
            parse_timestamp("2025-09-28 12:30:15.250").unwrap().date(),
            NaiveDate::from_ymd_opt(2025, 9, 28).unwrap()
        );
    }

    #[test]
    fn parses_postgres_timestamptz_text() {
        assert_eq!(
            parse_timestamp("2025-09-28 00:00:00+00").unwrap(),
            ts(2025, 9, 28, 0, 0, 0)
        );
    }

    #[test]
    fn parses_naive_iso_and_plain_date() {
        assert_eq!(
            parse_timestamp("2025-09-28T23:59:59").unwrap(),
            ts(2025, 9, 28, 23, 59, 59)
        );
        assert_eq!(
            parse_timestamp(" 2025-09-28 ").unwrap(),
            ts(2025, 9, 28, 0, 0, 0)
        );
    }

    #[test]
    fn garbage_is_an_error() {
        let err = parse_timestamp("last tuesday").unwrap_err();
        assert!(matches!(err, EtlError::Watermark(_)));
    }

    #[tokio::test]
    async fn empty_table_resolves_absent() {
        let tmp = TempDir::new().unwrap();
        let wh = SqliteWarehouse::open(&tmp.path().join("wm.sqlite"))
            .await
            .unwrap();
        wh.ensure_table("reports", "date_to").await.unwrap();

        let wm = resolve_watermark(&wh, "reports", "date_to").await.unwrap();
        assert!(wm.is_absent());
    }

    #[tokio::test]
    async fn resolves_latest_date() {
        let tmp = TempDir::new().unwrap();
        let wh = SqliteWarehouse::open(&tmp.path().join("wm.sqlite"))
            .await
            .unwrap();
        wh.ensure_table("reports", "date_to").await.unwrap();
        let columns = wh.columns("reports").await.unwrap();
        let rows: Vec<Record> = ["2025-09-14T00:00:00Z", "2025-09-28T00:00:00Z", "2025-09-21T00:00:00Z"]
            .iter()
            .map(|d| json!({ "date_to": d }).as_object().unwrap().clone())
            .collect();
        wh.append("reports", &columns, &rows).await.unwrap();

        let wm = resolve_watermark(&wh, "reports", "date_to").await.unwrap();
        assert_eq!(wm, Watermark(Some(ts(2025, 9, 28, 0, 0, 0))));
    }

    #[tokio::test]
    async fn missing_table_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let wh = SqliteWarehouse::open(&tmp.path().join("wm.sqlite"))
            .await
            .unwrap();
        let err = resolve_watermark(&wh, "reports", "date_to")
            .await
            .unwrap_err();
        assert!(matches!(err, EtlError::Connectivity { .. }));
    }
}
