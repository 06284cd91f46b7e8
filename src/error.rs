//! Error taxonomy for a pipeline run.
//!
//! Startup and configuration problems are reported through `anyhow` like the
//! rest of the CLI. Everything that can go wrong once a run has started is an
//! [`EtlError`], so the pipeline can decide per variant whether a failure is
//! fatal, a partial result, or a no-op.

use chrono::NaiveDate;

#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    /// The database could not be reached or a read query failed.
    #[error("database error while {context}: {source}")]
    Connectivity {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    /// The report API answered with a non-success status, or the request
    /// never got an answer (`status` is `None`).
    #[error("report API request failed{}: {message}", status_suffix(.status))]
    Http {
        status: Option<u16>,
        message: String,
    },

    /// The API answered 200 but the body is not usable.
    #[error("malformed report page: {0}")]
    Decode(String),

    /// Adding a column or appending rows to the target table failed.
    #[error("schema reconciliation on '{table}' failed: {detail}")]
    SchemaMismatch {
        table: String,
        detail: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// The computed window is inverted; nothing to fetch.
    #[error("empty fetch window: {from} is after {to}")]
    EmptyWindow { from: NaiveDate, to: NaiveDate },

    /// The stored watermark exists but is not a recognizable timestamp.
    #[error("unreadable watermark: {0}")]
    Watermark(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl EtlError {
    pub fn connectivity(context: impl Into<String>, source: sqlx::Error) -> Self {
        Self::Connectivity {
            context: context.into(),
            source,
        }
    }

    pub fn schema(table: &str, detail: impl Into<String>, source: sqlx::Error) -> Self {
        Self::SchemaMismatch {
            table: table.to_string(),
            detail: detail.into(),
            source: Some(source),
        }
    }

    /// An empty window ends the run without counting as a failure.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::EmptyWindow { .. })
    }

    /// Errors a page request can end in; these abort pagination instead of the run.
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Decode(_))
    }
}

impl From<reqwest::Error> for EtlError {
    fn from(e: reqwest::Error) -> Self {
        // Drop the URL: it carries the query string and is noise in notifications.
        let status = e.status().map(|s| s.as_u16());
        let message = e.without_url().to_string();
        Self::Http { status, message }
    }
}
