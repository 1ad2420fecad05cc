//! Change notifications
//!
//! When a run ends with a history digest different from the one it started
//! with, every configured notifier is called once with a [`RunSummary`].
//! Notification failures are logged and never fail the run.

use crate::history::{HistoryDiff, RunDigest};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a notifier
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned HTTP {0}")]
    Status(u16),
}

/// What changed during a run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub start_digest: RunDigest,
    pub end_digest: RunDigest,
    pub delivered: usize,
    pub skipped: usize,
    pub diff: HistoryDiff,
}

/// Receiver of "history changed" notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, summary: &RunSummary) -> Result<(), NotifyError>;
}

/// Writes the summary to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, summary: &RunSummary) -> Result<(), NotifyError> {
        tracing::info!(
            "History changed: {} new item(s), {} -> {}",
            summary.diff.added_count(),
            &summary.start_digest.as_str()[..12.min(summary.start_digest.as_str().len())],
            &summary.end_digest.as_str()[..12.min(summary.end_digest.as_str().len())]
        );
        for (source, categories) in &summary.diff.added {
            for (category, ids) in categories {
                let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
                tracing::info!("  {}/{}: {}", source, category, ids.join(", "));
            }
        }
        Ok(())
    }
}

/// POSTs the summary as JSON
pub struct WebhookNotifier {
    client: Client,
    url: String,
    timeout: Duration,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, summary: &RunSummary) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(summary)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Calls every notifier, logging failures
pub async fn notify_all(notifiers: &[Box<dyn Notifier>], summary: &RunSummary) {
    for notifier in notifiers {
        if let Err(e) = notifier.notify(summary).await {
            tracing::warn!("Notifier {} failed: {}", notifier.name(), e);
        }
    }
}
