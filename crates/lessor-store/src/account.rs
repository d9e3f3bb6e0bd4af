//! Inventory row model

use chrono::{DateTime, Utc};
use lessor_api::{AccountView, LeaseStatus, LeaseView};
use lessor_util::{AccountId, OwnerId};

/// Ownership state of a row, derived from its `owner`/`lease_start` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseState {
    Free,
    /// Held on behalf of a leased sibling
    Held { started_at: DateTime<Utc> },
    Leased {
        owner: OwnerId,
        started_at: DateTime<Utc>,
    },
}

/// One leasable unit of inventory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRow {
    pub id: AccountId,
    pub inventory_name: String,
    pub login: String,
    pub credential_ref: String,
    pub secret: String,
    pub lease_duration_hours: u32,
    pub state: LeaseState,
}

impl AccountRow {
    pub fn owner(&self) -> Option<&OwnerId> {
        match &self.state {
            LeaseState::Leased { owner, .. } => Some(owner),
            _ => None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.state == LeaseState::Free
    }

    /// Leased to a real renter (not a sibling hold)
    pub fn is_leased(&self) -> bool {
        matches!(self.state, LeaseState::Leased { .. })
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            LeaseState::Free => None,
            LeaseState::Held { started_at } | LeaseState::Leased { started_at, .. } => {
                Some(*started_at)
            }
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.started_at()
            .map(|start| lessor_util::lease_expiry(start, self.lease_duration_hours))
    }

    /// Time left on the lease; negative once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.expires_at().map(|expiry| expiry - now)
    }

    pub fn to_view(&self) -> AccountView {
        let status = match &self.state {
            LeaseState::Free => LeaseStatus::Free,
            LeaseState::Held { started_at } => LeaseStatus::SiblingHold {
                started_at: *started_at,
            },
            LeaseState::Leased { owner, started_at } => LeaseStatus::Leased {
                owner: owner.clone(),
                started_at: *started_at,
                expires_at: lessor_util::lease_expiry(*started_at, self.lease_duration_hours),
            },
        };

        AccountView {
            account_id: self.id,
            inventory_name: self.inventory_name.clone(),
            login: self.login.clone(),
            credential_ref: self.credential_ref.clone(),
            duration_hours: self.lease_duration_hours,
            status,
        }
    }

    /// Lease view including the secret; `None` unless leased to a renter
    pub fn to_lease_view(&self) -> Option<LeaseView> {
        match &self.state {
            LeaseState::Leased { owner, started_at } => Some(LeaseView {
                account_id: self.id,
                inventory_name: self.inventory_name.clone(),
                owner: owner.clone(),
                login: self.login.clone(),
                secret: self.secret.clone(),
                started_at: *started_at,
                duration_hours: self.lease_duration_hours,
                expires_at: lessor_util::lease_expiry(*started_at, self.lease_duration_hours),
            }),
            _ => None,
        }
    }
}

/// Result of trying to claim a free row of a lot
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    Claimed(AccountRow),
    /// The owner already leases a row of this lot
    OwnerHoldsLot(AccountRow),
    /// The lot exists but has no free row
    NoneFree,
    UnknownName,
}

/// Result of assigning a specific row
#[derive(Debug, Clone)]
pub enum AssignOutcome {
    Assigned(AccountRow),
    AlreadyLeased(AccountRow),
    NotFound,
}

/// Result of adding hours to a lease
#[derive(Debug, Clone)]
pub enum ExtendOutcome {
    Extended(AccountRow),
    /// The row exists and is leased, but the new total would pass the cap
    OverLimit(AccountRow),
    NotLeased,
}

/// Result of committing a rotated secret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationCommit {
    /// The expired lease was still in place: the group was freed
    Released(usize),
    /// The lease changed while the secret was being rotated. Only the new
    /// secret was stored; leases were left alone.
    LeaseChanged(usize),
}

/// Result of crediting a review
#[derive(Debug, Clone)]
pub enum FeedbackCredit {
    /// Every active lease of the buyer, after the bonus
    Credited(Vec<AccountRow>),
    AlreadyCredited,
    NoActiveLease,
}
