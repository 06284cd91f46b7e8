//! Core data types that flow between pipeline stages.
//!
//! A run produces exactly one [`FetchWindow`], a sequence of [`RecordBatch`]es
//! and one [`RecordSet`]; none of them outlive the run. The only persistent
//! state is the [`Watermark`], which lives in the target table itself.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashSet;
use serde_json::{Map, Value};

/// One flat report record: field name → scalar value.
pub type Record = Map<String, Value>;

/// Latest value of the target table's date column. `None` means the table is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark(pub Option<NaiveDateTime>);

impl Watermark {
    pub fn absent() -> Self {
        Self(None)
    }

    pub fn is_absent(&self) -> bool {
        self.0.is_none()
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(ts) => write!(f, "{}", ts),
            None => write!(f, "none (table is empty)"),
        }
    }
}

/// Inclusive date range requested from the report API for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
}

impl FetchWindow {
    /// `dateFrom` query value, midnight UTC.
    pub fn from_param(&self) -> String {
        format_api_date(self.date_from)
    }

    /// `dateTo` query value, midnight UTC.
    pub fn to_param(&self) -> String {
        format_api_date(self.date_to)
    }
}

impl std::fmt::Display for FetchWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} .. {}", self.date_from, self.date_to)
    }
}

fn format_api_date(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", date.format("%Y-%m-%d"))
}

/// Records returned by a single page request.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    /// Cursor value the page was requested with.
    pub cursor: i64,
    pub records: Vec<Record>,
}

impl RecordBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Every record fetched in one run, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, batch: RecordBatch) {
        self.records.extend(batch.records);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Union of all field names, in order of first appearance.
    pub fn field_names(&self) -> Vec<String> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut names: Vec<String> = Vec::new();
        for record in &self.records {
            for key in record.keys() {
                if seen.insert(key.as_str()) {
                    names.push(key.clone());
                }
            }
        }
        names
    }
}

impl From<Vec<Record>> for RecordSet {
    fn from(records: Vec<Record>) -> Self {
        Self { records }
    }
}

/// A column currently defined on the target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Type as reported by the backend (e.g. `bigint`, `TEXT`).
    pub data_type: String,
}
