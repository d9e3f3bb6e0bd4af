//! Core events emitted by the engine, sweeper and marketplace worker

use chrono::{DateTime, Utc};
use lessor_util::{AccountId, OwnerId};
use tokio::sync::mpsc;

/// Events emitted by the core
#[derive(Debug, Clone)]
pub enum CoreEvent {
    LeaseStarted {
        account_id: AccountId,
        inventory_name: String,
        owner: OwnerId,
        expires_at: DateTime<Utc>,
    },

    LeaseExtended {
        account_id: AccountId,
        owner: OwnerId,
        duration_hours: u32,
        expires_at: DateTime<Utc>,
    },

    LeaseReleased {
        account_id: AccountId,
        owner: OwnerId,
    },

    /// Lease is inside the warning window (repeats every sweep while inside)
    ExpiryWarning {
        account_id: AccountId,
        owner: OwnerId,
        remaining: chrono::Duration,
    },

    /// Secret rotated and sibling group returned to the free pool
    AccountRotated {
        account_id: AccountId,
        login: String,
    },

    RotationQuarantined {
        account_id: AccountId,
        reason: String,
    },
}

/// Optional event channel shared by the core workers
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<CoreEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<CoreEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops every event
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: CoreEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone means the daemon is shutting down
            let _ = tx.send(event);
        }
    }
}
