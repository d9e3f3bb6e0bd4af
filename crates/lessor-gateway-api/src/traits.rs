//! Gateway traits

use async_trait::async_trait;
use lessor_api::MarketplaceEvent;
use lessor_util::OwnerId;
use thiserror::Error;

/// Errors from gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The remote side could not be reached or timed out
    #[error("Network error: {0}")]
    Network(String),

    /// The remote side answered and refused the request
    #[error("Rejected: {0}")]
    Rejected(String),

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether retrying later could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Network(_))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Outbound messages to renters and the administrator.
///
/// Delivery is best effort: callers log failures and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_owner(&self, owner: &OwnerId, text: &str) -> GatewayResult<()>;

    async fn notify_admin(&self, text: &str) -> GatewayResult<()>;
}

/// Changes the secret of a real account at its provider.
#[async_trait]
pub trait SecretChanger: Send + Sync {
    /// Replace `old_secret` with `new_secret` for the account behind
    /// `credential_ref`. Returns only after the provider confirmed the change.
    async fn change_secret(
        &self,
        credential_ref: &str,
        old_secret: &str,
        new_secret: &str,
    ) -> GatewayResult<()>;
}

/// Offset between the provider's clock and ours, in seconds.
#[async_trait]
pub trait ClockSkewSource: Send + Sync {
    async fn skew_seconds(&self) -> GatewayResult<i64>;
}

/// Resolves a credential reference to its encoded two-factor shared secret.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn shared_secret(&self, credential_ref: &str) -> GatewayResult<String>;
}

/// Source of marketplace events (orders, chat messages, reviews).
#[async_trait]
pub trait MarketplaceFeed: Send + Sync {
    /// Events that arrived since the previous poll, oldest first
    async fn poll(&self) -> GatewayResult<Vec<MarketplaceEvent>>;
}
