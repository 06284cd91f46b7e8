//! Run notifications.
//!
//! The job reports its overall result through a [`Notifier`]. Two backends are
//! built in and selected by `[notify].kind`:
//!
//! - **`log`**: writes the message through the logger (the cron mail or the
//!   log collector picks it up).
//! - **`webhook`**: POSTs `{"status", "subject", "body"}` as JSON to
//!   `notify.webhook_url` (a chat hook or a mail relay).

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::config::NotifyConfig;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_success(&self, subject: &str, body: &str) -> Result<()>;
    async fn notify_failure(&self, subject: &str, body: &str) -> Result<()>;
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_success(&self, subject: &str, body: &str) -> Result<()> {
        log::info!("{subject}: {body}");
        Ok(())
    }

    async fn notify_failure(&self, subject: &str, body: &str) -> Result<()> {
        log::error!("{subject}: {body}");
        Ok(())
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    async fn post(&self, status: &str, subject: &str, body: &str) -> Result<()> {
        let payload = serde_json::json!({
            "status": status,
            "subject": subject,
            "body": body,
        });
        let response = self.client.post(&self.url).json(&payload).send().await?;
        let code = response.status();
        if !code.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("Notification webhook returned {}: {}", code, text);
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_success(&self, subject: &str, body: &str) -> Result<()> {
        self.post("success", subject, body).await
    }

    async fn notify_failure(&self, subject: &str, body: &str) -> Result<()> {
        self.post("failure", subject, body).await
    }
}

/// Build the notifier selected in the configuration.
pub fn create_notifier(config: &NotifyConfig) -> Result<Box<dyn Notifier>> {
    match config.kind.as_str() {
        "log" => Ok(Box::new(LogNotifier)),
        "webhook" => {
            let url = config
                .webhook_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("notify.webhook_url required for webhook notifier"))?;
            Ok(Box::new(WebhookNotifier::new(url)))
        }
        other => bail!("Unknown notify kind: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_is_rejected() {
        let config = NotifyConfig {
            kind: "carrier-pigeon".to_string(),
            ..Default::default()
        };
        assert!(create_notifier(&config).is_err());
    }

    #[test]
    fn webhook_without_url_is_rejected() {
        let config = NotifyConfig {
            kind: "webhook".to_string(),
            ..Default::default()
        };
        assert!(create_notifier(&config).is_err());
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        let notifier = create_notifier(&NotifyConfig::default()).unwrap();
        notifier.notify_success("s", "b").await.unwrap();
        notifier.notify_failure("s", "b").await.unwrap();
    }
}
