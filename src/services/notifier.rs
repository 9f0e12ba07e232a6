//! Notification collaborator
//!
//! Outbound messages (certificate issued, certificate revoked) are posted
//! to a configured webhook. Delivery is best-effort: a small fixed number
//! of retries with backoff, and callers log failures instead of failing
//! the operation that triggered the notification.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::types::{DependencyStep, LecternError, Result};

/// Delivery attempts before giving up
const SEND_ATTEMPTS: u32 = 3;

/// Base backoff between attempts
const RETRY_BACKOFF_MS: u64 = 500;

/// Outbound notification delivery
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Whether a delivery endpoint is configured; callers skip sending
    /// entirely when it is not
    fn is_configured(&self) -> bool;

    /// Deliver one message; never called with an unconfigured notifier
    /// except by mistake, in which case it fails with a dependency error
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

#[derive(Serialize)]
struct WebhookMessage<'a> {
    sender: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Webhook-backed [`Notifier`]
pub struct WebhookNotifier {
    endpoint: Option<String>,
    sender: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(endpoint: Option<String>, sender: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            endpoint,
            sender,
            client,
        }
    }

    async fn post_once(&self, endpoint: &str, message: &WebhookMessage<'_>) -> Result<()> {
        let response = self
            .client
            .post(endpoint)
            .json(message)
            .send()
            .await
            .map_err(|e| LecternError::Dependency {
                step: DependencyStep::Notify,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(LecternError::Dependency {
                step: DependencyStep::Notify,
                message: format!("webhook returned status {}", response.status()),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let endpoint = self.endpoint.as_deref().ok_or(LecternError::Dependency {
            step: DependencyStep::Notify,
            message: "notification webhook not configured".into(),
        })?;

        let message = WebhookMessage {
            sender: &self.sender,
            to,
            subject,
            body,
        };

        let mut last_error = None;
        for attempt in 1..=SEND_ATTEMPTS {
            match self.post_once(endpoint, &message).await {
                Ok(()) => {
                    debug!(to, subject, attempt, "notification delivered");
                    return Ok(());
                }
                Err(err) => {
                    warn!(to, subject, attempt, error = %err, "notification attempt failed");
                    last_error = Some(err);
                    if attempt < SEND_ATTEMPTS {
                        tokio::time::sleep(std::time::Duration::from_millis(
                            RETRY_BACKOFF_MS * u64::from(attempt),
                        ))
                        .await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or(LecternError::Dependency {
            step: DependencyStep::Notify,
            message: "notification delivery failed".into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unconfigured_notifier_reports_dependency_error() {
        let notifier = WebhookNotifier::new(None, "Lectern".into());
        assert!(!notifier.is_configured());

        let err = notifier.send("a@b.c", "subject", "body").await.unwrap_err();
        assert!(matches!(
            err,
            LecternError::Dependency {
                step: DependencyStep::Notify,
                ..
            }
        ));
    }
}
