//! Command types for the lessord protocol

use lessor_util::{AccountId, ClientId, OwnerId};
use serde::{Deserialize, Serialize};

use crate::{
    API_VERSION, AccountView, HealthStatus, InventoryStats, LeaseView, MarketplaceEvent,
    NewAccountSpec, QuarantineEntry,
};

/// Request wrapper with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for correlation
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// The command
    pub command: Command,
}

impl Request {
    pub fn new(request_id: u64, command: Command) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            command,
        }
    }
}

/// Response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Corresponding request ID
    pub request_id: u64,
    /// API version
    pub api_version: u32,
    /// Response payload or error
    pub result: ResponseResult,
}

impl Response {
    pub fn success(request_id: u64, payload: ResponsePayload) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Ok(payload),
        }
    }

    pub fn error(request_id: u64, error: ErrorInfo) -> Self {
        Self {
            request_id,
            api_version: API_VERSION,
            result: ResponseResult::Err(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseResult {
    Ok(ResponsePayload),
    Err(ErrorInfo),
}

/// Error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    NotFound,
    Conflict,
    AlreadyLeased,
    NotLeased,
    RotationFailed,
    TransientNetwork,
    PermissionDenied,
    InternalError,
}

/// How an extension names its lease
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum LeaseTarget {
    Account { account_id: AccountId },
    Owner { owner: OwnerId, inventory_name: String },
}

/// All possible commands from clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Lease a free row of a lot, or top up the caller's existing lease
    Allocate {
        inventory_name: String,
        owner: OwnerId,
        duration_hours: u32,
    },

    /// Add hours to an active lease
    Extend { target: LeaseTarget, hours: u32 },

    /// End a lease early (admin only)
    Release { account_id: AccountId },

    /// Hand a specific free row to an owner (admin only)
    ManualAssign {
        account_id: AccountId,
        owner: OwnerId,
    },

    /// Rows currently in the free pool
    ListFree,

    /// Every inventory row
    ListAll,

    /// Aggregate counters
    Stats,

    GetAccount { account_id: AccountId },

    /// Active leases of one renter
    LeasesOf { owner: OwnerId },

    // Admin inventory management
    AddAccount(NewAccountSpec),
    DeleteAccount { account_id: AccountId },
    RotateNow { account_id: AccountId },
    ListQuarantined,
    AddOperator { operator: String },
    ListOperators,

    /// Queue a marketplace event for the event worker
    SubmitEvent { event: MarketplaceEvent },

    /// Subscribe to events (returns immediately, events stream separately)
    SubscribeEvents,

    /// Unsubscribe from events
    UnsubscribeEvents,

    /// Get health status
    GetHealth,

    /// Ping for keepalive
    Ping,
}

impl Command {
    /// Whether the command mutates inventory outside the marketplace flow
    pub fn requires_admin(&self) -> bool {
        matches!(
            self,
            Command::Release { .. }
                | Command::ManualAssign { .. }
                | Command::GetAccount { .. }
                | Command::AddAccount(_)
                | Command::DeleteAccount { .. }
                | Command::RotateNow { .. }
                | Command::ListQuarantined
                | Command::AddOperator { .. }
                | Command::ListOperators
        )
    }
}

/// Response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponsePayload {
    Lease(LeaseView),
    Leases { leases: Vec<LeaseView> },
    Released,
    Accounts { accounts: Vec<AccountView> },
    Account(AccountView),
    Stats(InventoryStats),
    AccountsAdded { account_ids: Vec<AccountId> },
    Deleted { removed: usize },
    Rotated { account_id: AccountId },
    Quarantined { entries: Vec<QuarantineEntry> },
    OperatorAdded,
    Operators { operators: Vec<String> },
    EventQueued,
    Subscribed { client_id: ClientId },
    Unsubscribed,
    Health(HealthStatus),
    Pong,
}

/// Client connection info (set by IPC layer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: ClientId,
    pub role: crate::ClientRole,
    /// Unix UID if available
    pub uid: Option<u32>,
}

impl ClientInfo {
    pub fn new(role: crate::ClientRole) -> Self {
        Self {
            client_id: ClientId::new(),
            role,
            uid: None,
        }
    }

    pub fn with_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }
}
