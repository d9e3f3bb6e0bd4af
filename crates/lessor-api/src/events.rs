//! Event types for lessord -> client streaming

use chrono::{DateTime, Utc};
use lessor_util::{AccountId, OwnerId};
use serde::{Deserialize, Serialize};

use crate::API_VERSION;

/// Event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub api_version: u32,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            api_version: API_VERSION,
            timestamp: lessor_util::now(),
            payload,
        }
    }
}

/// Lease lifecycle events. Secrets never appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
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

    ExpiryWarning {
        account_id: AccountId,
        owner: OwnerId,
        remaining_minutes: i64,
    },

    /// Secret replaced and the sibling group returned to the free pool
    AccountRotated {
        account_id: AccountId,
        login: String,
    },

    RotationQuarantined {
        account_id: AccountId,
        reason: String,
    },

    /// Daemon is shutting down
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization() {
        let event = Event::new(EventPayload::LeaseStarted {
            account_id: AccountId::new(4),
            inventory_name: "LotA".into(),
            owner: OwnerId::new("alice"),
            expires_at: lessor_util::now(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"lease_started\""));

        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.api_version, API_VERSION);
        assert!(matches!(parsed.payload, EventPayload::LeaseStarted { .. }));
    }
}
