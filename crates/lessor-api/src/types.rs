//! Shared view types for the lessord protocol

use chrono::{DateTime, Utc};
use lessor_util::{AccountId, OwnerId};
use serde::{Deserialize, Serialize};

/// Occupancy of an inventory row as seen by clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LeaseStatus {
    /// In the free pool
    Free,
    /// Exclusively leased to a renter
    Leased {
        owner: OwnerId,
        started_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    /// Unavailable because another row of the same sibling group is leased
    SiblingHold { started_at: DateTime<Utc> },
}

impl LeaseStatus {
    pub fn is_free(&self) -> bool {
        matches!(self, LeaseStatus::Free)
    }
}

/// Inventory row without secret material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountView {
    pub account_id: AccountId,
    pub inventory_name: String,
    pub login: String,
    pub credential_ref: String,
    pub duration_hours: u32,
    pub status: LeaseStatus,
}

/// An active lease including the credential handed to the renter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseView {
    pub account_id: AccountId,
    pub inventory_name: String,
    pub owner: OwnerId,
    pub login: String,
    pub secret: String,
    pub started_at: DateTime<Utc>,
    pub duration_hours: u32,
    pub expires_at: DateTime<Utc>,
}

/// Aggregate inventory counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStats {
    pub total: u64,
    /// Rows leased to a real renter
    pub active: u64,
    /// Rows held because a sibling is leased
    pub held: u64,
    pub free: u64,
    /// Sum of `duration_hours` over active leases
    pub leased_hours: u64,
    /// Active leases started in the last 24 hours
    pub started_last_24h: u64,
    pub quarantined: u64,
}

/// Administrator request to add one real account under one or more lot names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccountSpec {
    pub inventory_names: Vec<String>,
    pub login: String,
    pub credential_ref: String,
    pub secret: String,
    pub duration_hours: u32,
}

/// A row whose rotation failed and is excluded from further attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarantineEntry {
    pub account_id: AccountId,
    pub reason: String,
    pub since: DateTime<Utc>,
}

/// Events delivered by the marketplace bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketplaceEvent {
    /// A buyer paid for a listing
    NewOrder {
        order_id: String,
        buyer: OwnerId,
        description: String,
        quantity: u32,
    },

    /// A chat message addressed to the seller
    NewMessage {
        author: OwnerId,
        text: String,
        /// Listing title the author is currently looking at, if known
        #[serde(default)]
        viewing: Option<String>,
    },

    /// System message announcing a review; the text names the buyer
    NewFeedback { text: String },
}

/// Client role for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRole {
    /// Marketplace bridge: submits events and read-only queries
    Bridge,
    /// Local administrator
    Admin,
}

impl ClientRole {
    pub fn can_administer(&self) -> bool {
        matches!(self, ClientRole::Admin)
    }
}

/// Health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub live: bool,
    pub store_ok: bool,
}
