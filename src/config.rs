//! TOML configuration parsing.
//!
//! The configuration is loaded once at startup and passed by reference into
//! every component. Secrets (database URL, API token) are not stored in the
//! file: the file names the environment variables that hold them.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub api: ApiConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Inline connection URL. Takes precedence over `url_env`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_db_url_env")]
    pub url_env: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_date_column")]
    pub date_column: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_url_env() -> String {
    "DATABASE_URL".to_string()
}
fn default_table() -> String {
    "api_wb_FinanceReport".to_string()
}
fn default_date_column() -> String {
    "date_to".to_string()
}
fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub url: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    #[serde(default = "default_request_interval_secs")]
    pub request_interval_secs: u64,
    #[serde(default = "default_cursor_field")]
    pub cursor_field: String,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_token_env() -> String {
    "WB_API_TOKEN".to_string()
}
fn default_page_limit() -> usize {
    10_000
}
fn default_request_interval_secs() -> u64 {
    61
}
fn default_cursor_field() -> String {
    "rrd_id".to_string()
}

impl ApiConfig {
    pub fn request_interval(&self) -> Duration {
        Duration::from_secs(self.request_interval_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowConfig {
    #[serde(default = "default_start")]
    pub default_start: NaiveDate,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            default_start: default_start(),
        }
    }
}

fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid constant date")
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_kind")]
    pub kind: String,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_subject")]
    pub subject: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            kind: default_notify_kind(),
            webhook_url: None,
            subject: default_subject(),
        }
    }
}

fn default_notify_kind() -> String {
    "log".to_string()
}
fn default_subject() -> String {
    "Finance Reports".to_string()
}

impl Config {
    /// Database URL from `db.url`, falling back to the `db.url_env` variable.
    pub fn database_url(&self) -> Result<String> {
        if let Some(url) = &self.db.url {
            return Ok(url.clone());
        }
        std::env::var(&self.db.url_env).with_context(|| {
            format!(
                "No db.url in config and environment variable {} is not set",
                self.db.url_env
            )
        })
    }

    /// Report API token from the `api.token_env` variable.
    pub fn api_token(&self) -> Result<String> {
        let token = std::env::var(&self.api.token_env)
            .with_context(|| format!("Environment variable {} is not set", self.api.token_env))?;
        if token.trim().is_empty() {
            anyhow::bail!("Environment variable {} is empty", self.api.token_env);
        }
        Ok(token)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.db.table.trim().is_empty() {
        anyhow::bail!("db.table must not be empty");
    }
    if config.db.date_column.trim().is_empty() {
        anyhow::bail!("db.date_column must not be empty");
    }
    if config.db.max_connections == 0 {
        anyhow::bail!("db.max_connections must be >= 1");
    }

    if config.api.url.trim().is_empty() {
        anyhow::bail!("api.url must not be empty");
    }
    if config.api.page_limit == 0 {
        anyhow::bail!("api.page_limit must be > 0");
    }
    if config.api.cursor_field.trim().is_empty() {
        anyhow::bail!("api.cursor_field must not be empty");
    }

    match config.notify.kind.as_str() {
        "log" => {}
        "webhook" => {
            if config.notify.webhook_url.is_none() {
                anyhow::bail!("notify.webhook_url must be set when notify.kind is 'webhook'");
            }
        }
        other => anyhow::bail!(
            "Unknown notify kind: '{}'. Must be log or webhook.",
            other
        ),
    }

    Ok(config)
}
