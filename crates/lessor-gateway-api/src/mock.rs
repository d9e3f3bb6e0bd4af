//! In-memory gateway doubles for unit/integration testing

use async_trait::async_trait;
use lessor_api::MarketplaceEvent;
use lessor_util::OwnerId;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::{
    ClockSkewSource, CredentialSource, GatewayError, GatewayResult, MarketplaceFeed, Notifier,
    SecretChanger,
};

/// Who a recorded message was addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    Owner(OwnerId),
    Admin,
}

/// Records every message instead of delivering it
#[derive(Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<(Recipient, String)>>>,

    /// Configure delivery to fail
    pub fail: Arc<Mutex<bool>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages in send order
    pub fn sent(&self) -> Vec<(Recipient, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages sent to one owner
    pub fn sent_to(&self, owner: &OwnerId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| matches!(r, Recipient::Owner(o) if o == owner))
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Messages sent to the administrator
    pub fn sent_to_admin(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(r, _)| *r == Recipient::Admin)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    fn record(&self, recipient: Recipient, text: &str) -> GatewayResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(GatewayError::Network("Mock delivery failure".into()));
        }
        self.sent.lock().unwrap().push((recipient, text.to_string()));
        Ok(())
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify_owner(&self, owner: &OwnerId, text: &str) -> GatewayResult<()> {
        self.record(Recipient::Owner(owner.clone()), text)
    }

    async fn notify_admin(&self, text: &str) -> GatewayResult<()> {
        self.record(Recipient::Admin, text)
    }
}

/// Accepts (or refuses) secret changes and counts attempts
#[derive(Default)]
pub struct MockSecretChanger {
    calls: AtomicUsize,
    changes: Arc<Mutex<Vec<(String, String)>>>,

    /// Configure changes to be rejected
    pub fail: Arc<Mutex<bool>>,
}

impl MockSecretChanger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of change attempts, successful or not
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Accepted changes as (credential_ref, new_secret)
    pub fn changes(&self) -> Vec<(String, String)> {
        self.changes.lock().unwrap().clone()
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl SecretChanger for MockSecretChanger {
    async fn change_secret(
        &self,
        credential_ref: &str,
        _old_secret: &str,
        new_secret: &str,
    ) -> GatewayResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(GatewayError::Rejected("Mock provider refused the change".into()));
        }
        self.changes
            .lock()
            .unwrap()
            .push((credential_ref.to_string(), new_secret.to_string()));
        Ok(())
    }
}

/// Constant clock skew, or a simulated outage
pub struct FixedSkew {
    skew: Option<i64>,
}

impl FixedSkew {
    pub fn new(skew: i64) -> Self {
        Self { skew: Some(skew) }
    }

    /// A time source that is always unreachable
    pub fn unreachable() -> Self {
        Self { skew: None }
    }
}

#[async_trait]
impl ClockSkewSource for FixedSkew {
    async fn skew_seconds(&self) -> GatewayResult<i64> {
        self.skew
            .ok_or_else(|| GatewayError::Network("Mock time source unreachable".into()))
    }
}

/// Shared secrets keyed by credential reference
#[derive(Default)]
pub struct MockCredentials {
    secrets: Mutex<HashMap<String, String>>,
}

impl MockCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(self, credential_ref: &str, shared_secret: &str) -> Self {
        self.secrets
            .lock()
            .unwrap()
            .insert(credential_ref.to_string(), shared_secret.to_string());
        self
    }
}

#[async_trait]
impl CredentialSource for MockCredentials {
    async fn shared_secret(&self, credential_ref: &str) -> GatewayResult<String> {
        self.secrets
            .lock()
            .unwrap()
            .get(credential_ref)
            .cloned()
            .ok_or_else(|| GatewayError::Rejected(format!("Unknown credential {credential_ref}")))
    }
}

/// Scripted marketplace feed: each poll drains everything pushed so far
#[derive(Default)]
pub struct MockFeed {
    pending: Mutex<VecDeque<MarketplaceEvent>>,
}

impl MockFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: MarketplaceEvent) {
        self.pending.lock().unwrap().push_back(event);
    }
}

#[async_trait]
impl MarketplaceFeed for MockFeed {
    async fn poll(&self) -> GatewayResult<Vec<MarketplaceEvent>> {
        Ok(self.pending.lock().unwrap().drain(..).collect())
    }
}
