//! Audit event types

use chrono::{DateTime, Utc};
use lessor_util::{AccountId, OwnerId};
use serde::{Deserialize, Serialize};

/// Types of audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    ServiceStarted,

    ServiceStopped,

    /// Administrator added rows for one real account
    AccountsAdded {
        login: String,
        account_ids: Vec<AccountId>,
    },

    /// Administrator removed a sibling group
    AccountsDeleted { login: String, removed: usize },

    LeaseStarted {
        account_id: AccountId,
        owner: OwnerId,
        inventory_name: String,
        duration_hours: u32,
        /// Assigned by an administrator rather than ordered
        manual: bool,
    },

    LeaseExtended {
        account_id: AccountId,
        owner: OwnerId,
        added_hours: u32,
        duration_hours: u32,
    },

    LeaseReleased {
        account_id: AccountId,
        owner: OwnerId,
    },

    /// Secret replaced at the provider
    SecretRotated { login: String, released: bool },

    RotationFailed { account_id: AccountId, reason: String },

    FeedbackCredited { owner: OwnerId, leases: usize },

    OperatorAdded { operator: String },

    ClientConnected {
        client_id: String,
        role: String,
        uid: Option<u32>,
    },

    ClientDisconnected { client_id: String },
}

/// Full audit event with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: i64,

    pub timestamp: DateTime<Utc>,

    pub event: AuditEventType,
}

impl AuditEvent {
    pub fn new(event: AuditEventType) -> Self {
        Self {
            id: 0, // Will be set by store
            timestamp: lessor_util::now(),
            event,
        }
    }
}
