//! Notifiers: webhook delivery and a log-only fallback

use async_trait::async_trait;
use lessor_gateway_api::{GatewayError, GatewayResult, Notifier};
use lessor_util::OwnerId;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(15);

/// Recipient name used for the administrator when no id is configured
pub const ADMIN_RECIPIENT: &str = "admin";

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    recipient: &'a str,
    text: &'a str,
}

/// Posts `{"recipient": .., "text": ..}` to a webhook; the marketplace
/// bridge behind it delivers the text as a chat message.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    admin_id: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, admin_id: Option<String>) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            admin_id: admin_id.unwrap_or_else(|| ADMIN_RECIPIENT.to_string()),
        })
    }

    async fn post(&self, recipient: &str, text: &str) -> GatewayResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookMessage { recipient, text })
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(GatewayError::Network(format!("webhook returned {}", status)));
        }
        if !status.is_success() {
            return Err(GatewayError::Rejected(format!("webhook returned {}", status)));
        }

        debug!(recipient, "Notification delivered");
        Ok(())
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify_owner(&self, owner: &OwnerId, text: &str) -> GatewayResult<()> {
        self.post(owner.as_str(), text).await
    }

    async fn notify_admin(&self, text: &str) -> GatewayResult<()> {
        self.post(&self.admin_id, text).await
    }
}

/// Writes notifications to the log only. Message bodies can carry secrets,
/// so they are logged at debug level.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_owner(&self, owner: &OwnerId, text: &str) -> GatewayResult<()> {
        info!(recipient = %owner, "Notification (not delivered, no webhook configured)");
        debug!(recipient = %owner, text, "Notification body");
        Ok(())
    }

    async fn notify_admin(&self, text: &str) -> GatewayResult<()> {
        info!(recipient = ADMIN_RECIPIENT, "Notification (not delivered, no webhook configured)");
        debug!(recipient = ADMIN_RECIPIENT, text, "Notification body");
        Ok(())
    }
}
