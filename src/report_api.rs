//! HTTP client for the finance report endpoint.
//!
//! # Request
//!
//! ```text
//! GET <api.url>?dateFrom=2025-09-29T00:00:00Z&dateTo=2025-10-12T00:00:00Z&limit=10000&rrdid=0
//! Authorization: <token>
//! ```
//!
//! # Response
//!
//! `200` with a JSON array of flat objects. Some deployments answer an
//! exhausted cursor with an empty body or `null`; both count as zero records.
//! Any other status is an [`EtlError::Http`].

use async_trait::async_trait;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::EtlError;
use crate::fetch::{PageRequest, ReportSource};
use crate::models::Record;

/// Longest response body excerpt carried into an error message.
const ERROR_BODY_LIMIT: usize = 500;

pub struct HttpReportSource {
    client: reqwest::Client,
    url: String,
    token: String,
}

impl HttpReportSource {
    pub fn new(config: &ApiConfig, token: String) -> Result<Self, EtlError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            token,
        })
    }
}

#[async_trait]
impl ReportSource for HttpReportSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Vec<Record>, EtlError> {
        let params = [
            ("dateFrom", request.window.from_param()),
            ("dateTo", request.window.to_param()),
            ("limit", request.limit.to_string()),
            ("rrdid", request.cursor.to_string()),
        ];
        log::debug!(
            "GET report page dateFrom={} dateTo={} limit={} rrdid={}",
            params[0].1,
            params[1].1,
            params[2].1,
            params[3].1
        );

        let response = self
            .client
            .get(&self.url)
            .query(&params)
            .header("Authorization", &self.token)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if status != reqwest::StatusCode::OK {
            let mut message: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            if message.trim().is_empty() {
                message = status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string();
            }
            return Err(EtlError::Http {
                status: Some(status.as_u16()),
                message,
            });
        }

        parse_page(&body)
    }
}

/// Decode a page body into flat records.
pub fn parse_page(body: &str) -> Result<Vec<Record>, EtlError> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| EtlError::Decode(format!("response is not JSON: {e}")))?;

    let items = match value {
        serde_json::Value::Null => return Ok(Vec::new()),
        serde_json::Value::Array(items) => items,
        other => {
            return Err(EtlError::Decode(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(EtlError::Decode(format!(
                "element {i} is {}, expected an object",
                json_kind(&other)
            ))),
        })
        .collect()
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
