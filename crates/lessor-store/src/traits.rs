//! Store trait definitions

use chrono::{DateTime, Utc};
use lessor_api::{InventoryStats, NewAccountSpec, QuarantineEntry};
use lessor_util::{AccountId, OwnerId};

use crate::{
    AccountRow, AssignOutcome, AuditEvent, ClaimOutcome, ExtendOutcome, FeedbackCredit,
    RotationCommit, StoreResult,
};

/// Main store trait.
///
/// Every method that changes ownership is a single atomic transaction, so
/// concurrent workers sharing one store never observe a half-applied
/// sibling-group update.
pub trait Store: Send + Sync {
    // Audit log

    /// Append an audit event
    fn append_audit(&self, event: AuditEvent) -> StoreResult<()>;

    /// Get recent audit events
    fn get_recent_audits(&self, limit: usize) -> StoreResult<Vec<AuditEvent>>;

    // Inventory

    /// Insert one row per inventory name, all sharing one login.
    ///
    /// If the login already has a leased row, the new rows start out held.
    fn add_accounts(&self, spec: &NewAccountSpec) -> StoreResult<Vec<AccountId>>;

    /// Delete every row sharing the login of `id`. Returns the login and
    /// number of rows removed, or `None` for an unknown id.
    fn delete_sibling_group(&self, id: AccountId) -> StoreResult<Option<(String, usize)>>;

    fn get_account(&self, id: AccountId) -> StoreResult<Option<AccountRow>>;

    /// All rows ordered by id
    fn list_accounts(&self) -> StoreResult<Vec<AccountRow>>;

    /// Free rows ordered by id
    fn list_free(&self) -> StoreResult<Vec<AccountRow>>;

    /// Distinct inventory names ordered by their lowest row id
    fn inventory_names(&self, free_only: bool) -> StoreResult<Vec<String>>;

    /// (free, total) row counts for one inventory name
    fn count_by_name(&self, inventory_name: &str) -> StoreResult<(u64, u64)>;

    /// The owner's active lease on a lot, if any
    fn find_active_lease(
        &self,
        owner: &OwnerId,
        inventory_name: &str,
    ) -> StoreResult<Option<AccountRow>>;

    /// Active leases of one owner, newest first
    fn active_leases_for(&self, owner: &OwnerId) -> StoreResult<Vec<AccountRow>>;

    /// Every row leased to a real renter (sibling holds excluded)
    fn list_active_leases(&self) -> StoreResult<Vec<AccountRow>>;

    // Lease transitions

    /// Claim the lowest-id free row of a lot for `owner`, holding every
    /// sibling. Refuses when the owner already leases that lot.
    fn claim_free(
        &self,
        inventory_name: &str,
        owner: &OwnerId,
        duration_hours: u32,
        start: DateTime<Utc>,
    ) -> StoreResult<ClaimOutcome>;

    /// Claim a specific row, keeping its configured duration
    fn assign(
        &self,
        id: AccountId,
        owner: &OwnerId,
        start: DateTime<Utc>,
    ) -> StoreResult<AssignOutcome>;

    /// Add hours to a leased row, refusing to go past `max_hours` in total
    fn extend(
        &self,
        id: AccountId,
        add_hours: u32,
        max_hours: u32,
    ) -> StoreResult<ExtendOutcome>;

    /// Clear a leased row and release its held siblings. Returns the row as
    /// it was before release, `None` if it was not leased.
    fn release(&self, id: AccountId) -> StoreResult<Option<AccountRow>>;

    /// Persist a rotated secret for `expired`'s group and clear quarantine.
    ///
    /// The group is freed with durations reset only if `expired` still has
    /// the owner, start and duration it was read with. Otherwise just the
    /// secret is stored.
    fn complete_rotation(
        &self,
        expired: &AccountRow,
        new_secret: &str,
        reset_duration_hours: u32,
    ) -> StoreResult<RotationCommit>;

    /// Persist a rotated secret without touching leases; clears quarantine
    fn replace_group_secret(&self, login: &str, new_secret: &str) -> StoreResult<usize>;

    // Rotation quarantine

    fn quarantine(&self, id: AccountId, reason: &str, since: DateTime<Utc>) -> StoreResult<()>;

    fn is_quarantined(&self, id: AccountId) -> StoreResult<bool>;

    fn list_quarantined(&self) -> StoreResult<Vec<QuarantineEntry>>;

    // Feedback

    /// Extend every active lease of `owner` by `bonus_hours`, at most once
    /// per owner ever. Totals are capped at `max_hours`.
    fn credit_feedback(
        &self,
        owner: &OwnerId,
        bonus_hours: u32,
        max_hours: u32,
        at: DateTime<Utc>,
    ) -> StoreResult<FeedbackCredit>;

    // Reporting

    fn stats(&self, now: DateTime<Utc>) -> StoreResult<InventoryStats>;

    // Operators

    /// Returns false if the operator was already present
    fn add_operator(&self, operator: &str) -> StoreResult<bool>;

    fn list_operators(&self) -> StoreResult<Vec<String>>;

    fn is_operator(&self, operator: &str) -> StoreResult<bool>;

    // Health

    /// Check if store is healthy
    fn is_healthy(&self) -> bool;
}
