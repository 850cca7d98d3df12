//! Failure alert delivery. Alerts are strictly best-effort: a broken
//! webhook must never take down the run that tried to report a problem.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::traits::{AlertSink, FailureContext};

const ALERT_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts the failure context as JSON to a configured webhook.
pub struct WebhookAlerter {
    url: String,
    http: reqwest::Client,
}

impl WebhookAlerter {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl AlertSink for WebhookAlerter {
    async fn notify(&self, context: &FailureContext) {
        let result = self
            .http
            .post(&self.url)
            .timeout(ALERT_TIMEOUT)
            .json(context)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!(topic = context.topic.as_str(), kind = context.error_kind.as_str(), "Alert delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "Alert webhook rejected the payload");
            }
            Err(e) => {
                warn!(error = %e, "Failed to deliver alert");
            }
        }
    }
}

/// Used when no webhook is configured; failures still land in the logs.
pub struct NoopAlerter;

#[async_trait]
impl AlertSink for NoopAlerter {
    async fn notify(&self, context: &FailureContext) {
        warn!(
            topic = context.topic.as_str(),
            run_id = %context.run_id,
            kind = context.error_kind.as_str(),
            error = context.error.as_str(),
            "Run failure (no alert webhook configured)"
        );
    }
}
