//! Outcome delivery to an external HTTP endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::job::JobOutcome;

/// Notifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Endpoint that receives each terminal outcome as a JSON POST.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    10
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Errors delivering an outcome.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid webhook configuration: {0}")]
    Config(String),

    #[error("Webhook request failed: {0}")]
    Request(String),

    #[error("Webhook returned status {0}")]
    Status(u16),
}

/// Receives terminal job outcomes.
#[async_trait]
pub trait OutcomeNotifier: Send + Sync {
    async fn notify(&self, outcome: &JobOutcome) -> Result<(), NotifyError>;
}

/// POSTs outcomes as JSON.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(NotifyError::Config(format!("unsupported webhook URL: {}", url)));
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Config(e.to_string()))?;

        Ok(Self { client, url })
    }

    /// Builds a notifier when a webhook URL is configured.
    pub fn from_config(config: &NotifierConfig) -> Result<Option<Self>, NotifyError> {
        match config.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(url) => Self::new(url, Duration::from_secs(config.timeout_secs)).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OutcomeNotifier for WebhookNotifier {
    async fn notify(&self, outcome: &JobOutcome) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(outcome)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}
