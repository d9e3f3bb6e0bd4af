//! Allocation engine: the lease state machine

use chrono::{DateTime, Utc};
use lessor_api::{
    AccountView, InventoryStats, LeaseTarget, LeaseView, NewAccountSpec, QuarantineEntry,
};
use lessor_config::LeasingConfig;
use lessor_gateway_api::Notifier;
use lessor_store::{
    AccountRow, AssignOutcome, AuditEvent, AuditEventType, ClaimOutcome, ExtendOutcome,
    FeedbackCredit, Store,
};
use lessor_util::{AccountId, OwnerId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{CoreEvent, EventSink, LeaseError, LeaseResult, notices};

/// Result of an allocation request
#[derive(Debug, Clone)]
pub enum Allocation {
    /// A free row was claimed
    Started(LeaseView),
    /// The owner already leased this lot; the lease was topped up
    Extended(LeaseView),
}

impl Allocation {
    pub fn lease(&self) -> &LeaseView {
        match self {
            Allocation::Started(lease) | Allocation::Extended(lease) => lease,
        }
    }

    pub fn into_lease(self) -> LeaseView {
        match self {
            Allocation::Started(lease) | Allocation::Extended(lease) => lease,
        }
    }
}

/// The allocation engine.
///
/// Holds no lease state of its own: every transition is one atomic store
/// call, so the engine can be shared by the command handler and the
/// marketplace worker without further locking.
pub struct AllocationEngine {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    leasing: LeasingConfig,
    events: EventSink,
}

impl AllocationEngine {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        leasing: LeasingConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            leasing,
            events: EventSink::disabled(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn leasing(&self) -> &LeasingConfig {
        &self.leasing
    }

    fn lease_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.leasing.lease_start_offset
    }

    fn check_owner(owner: &OwnerId) -> LeaseResult<()> {
        if owner.as_str().trim().is_empty() {
            return Err(LeaseError::InvalidRequest("owner cannot be empty".into()));
        }
        if owner.is_sibling_hold() {
            return Err(LeaseError::InvalidRequest(format!(
                "'{owner}' is a reserved owner id"
            )));
        }
        Ok(())
    }

    fn check_hours(&self, hours: u32) -> LeaseResult<()> {
        if hours == 0 {
            return Err(LeaseError::InvalidRequest(
                "duration must be at least 1 hour".into(),
            ));
        }
        if hours > self.leasing.max_lease_hours {
            return Err(LeaseError::InvalidRequest(format!(
                "{hours} hours exceeds the maximum lease of {} hours",
                self.leasing.max_lease_hours
            )));
        }
        Ok(())
    }

    /// Lease a free row of `inventory_name` to `owner`.
    ///
    /// If the owner already leases that lot, the existing lease is extended
    /// by `duration_hours` instead.
    pub async fn allocate(
        &self,
        inventory_name: &str,
        owner: &OwnerId,
        duration_hours: u32,
        now: DateTime<Utc>,
    ) -> LeaseResult<Allocation> {
        Self::check_owner(owner)?;
        self.check_hours(duration_hours)?;

        if let Some(existing) = self.store.find_active_lease(owner, inventory_name)? {
            debug!(account_id = %existing.id, owner = %owner, "Owner already leases lot, topping up");
            let lease = self.extend_account(existing.id, duration_hours).await?;
            return Ok(Allocation::Extended(lease));
        }

        let start = self.lease_start(now);
        match self
            .store
            .claim_free(inventory_name, owner, duration_hours, start)?
        {
            ClaimOutcome::Claimed(row) => {
                let lease = self.lease_started(&row, false).await?;
                Ok(Allocation::Started(lease))
            }
            ClaimOutcome::OwnerHoldsLot(row) => {
                // A concurrent order by the same owner claimed first
                let lease = self.extend_account(row.id, duration_hours).await?;
                Ok(Allocation::Extended(lease))
            }
            ClaimOutcome::NoneFree => {
                info!(inventory_name, owner = %owner, "No free account for lot");
                Err(LeaseError::Conflict(inventory_name.to_string()))
            }
            ClaimOutcome::UnknownName => Err(LeaseError::NotFound(format!(
                "inventory name '{inventory_name}'"
            ))),
        }
    }

    /// Add hours to an active lease
    pub async fn extend(&self, target: &LeaseTarget, hours: u32) -> LeaseResult<LeaseView> {
        self.check_hours(hours)?;

        let account_id = match target {
            LeaseTarget::Account { account_id } => *account_id,
            LeaseTarget::Owner {
                owner,
                inventory_name,
            } => match self.store.find_active_lease(owner, inventory_name)? {
                Some(row) => row.id,
                None => {
                    return Err(LeaseError::NotLeased(format!(
                        "{owner} has no lease of '{inventory_name}'"
                    )));
                }
            },
        };

        self.extend_account(account_id, hours).await
    }

    async fn extend_account(&self, account_id: AccountId, hours: u32) -> LeaseResult<LeaseView> {
        let max_hours = self.leasing.max_lease_hours;
        let row = match self.store.extend(account_id, hours, max_hours)? {
            ExtendOutcome::Extended(row) => row,
            ExtendOutcome::OverLimit(row) => {
                return Err(LeaseError::InvalidRequest(format!(
                    "account {account_id} already runs {} hours; adding {hours} exceeds \
                     the maximum lease of {max_hours} hours",
                    row.lease_duration_hours
                )));
            }
            ExtendOutcome::NotLeased => return Err(self.missing_lease(account_id)?),
        };
        let lease = Self::leased_view(&row)?;

        info!(
            account_id = %account_id,
            owner = %lease.owner,
            added_hours = hours,
            duration_hours = lease.duration_hours,
            "Lease extended"
        );

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::LeaseExtended {
                account_id,
                owner: lease.owner.clone(),
                added_hours: hours,
                duration_hours: lease.duration_hours,
            }));

        self.notify_owner(&lease.owner, &notices::lease_extended(&lease, hours))
            .await;
        self.events.emit(CoreEvent::LeaseExtended {
            account_id,
            owner: lease.owner.clone(),
            duration_hours: lease.duration_hours,
            expires_at: lease.expires_at,
        });

        Ok(lease)
    }

    /// End a lease early. Held siblings return to the free pool; the
    /// duration is left as is.
    pub async fn release(&self, account_id: AccountId) -> LeaseResult<()> {
        let Some(prior) = self.store.release(account_id)? else {
            return Err(self.missing_lease(account_id)?);
        };
        let owner = prior
            .owner()
            .cloned()
            .ok_or_else(|| LeaseError::NotLeased(format!("account {account_id}")))?;

        info!(account_id = %account_id, owner = %owner, "Lease released");

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::LeaseReleased {
                account_id,
                owner: owner.clone(),
            }));

        self.notify_owner(
            &owner,
            &notices::lease_released(account_id, &prior.inventory_name),
        )
        .await;
        self.events.emit(CoreEvent::LeaseReleased { account_id, owner });

        Ok(())
    }

    /// Hand a specific free row to `owner`, keeping the row's duration
    pub async fn manual_assign(
        &self,
        account_id: AccountId,
        owner: &OwnerId,
        now: DateTime<Utc>,
    ) -> LeaseResult<LeaseView> {
        Self::check_owner(owner)?;

        match self.store.assign(account_id, owner, self.lease_start(now))? {
            AssignOutcome::Assigned(row) => self.lease_started(&row, true).await,
            AssignOutcome::AlreadyLeased(_) => Err(LeaseError::AlreadyLeased(account_id)),
            AssignOutcome::NotFound => Err(LeaseError::NotFound(format!("account {account_id}"))),
        }
    }

    /// Extend every active lease of a reviewer, once per reviewer.
    ///
    /// Returns the extended leases, or an empty list when the reviewer was
    /// already credited or has nothing to extend.
    pub async fn credit_review(
        &self,
        owner: &OwnerId,
        now: DateTime<Utc>,
    ) -> LeaseResult<Vec<LeaseView>> {
        Self::check_owner(owner)?;
        let bonus = self.leasing.review_bonus_hours;

        let rows = match self
            .store
            .credit_feedback(owner, bonus, self.leasing.max_lease_hours, now)?
        {
            FeedbackCredit::Credited(rows) => rows,
            FeedbackCredit::AlreadyCredited => {
                debug!(owner = %owner, "Review already credited");
                return Ok(Vec::new());
            }
            FeedbackCredit::NoActiveLease => {
                debug!(owner = %owner, "Reviewer has no active lease");
                return Ok(Vec::new());
            }
        };

        let leases = rows
            .iter()
            .map(Self::leased_view)
            .collect::<LeaseResult<Vec<_>>>()?;

        info!(owner = %owner, leases = leases.len(), bonus_hours = bonus, "Review credited");

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::FeedbackCredited {
                owner: owner.clone(),
                leases: leases.len(),
            }));

        self.notify_owner(owner, &notices::feedback_credited(bonus, leases.len()))
            .await;
        for lease in &leases {
            self.events.emit(CoreEvent::LeaseExtended {
                account_id: lease.account_id,
                owner: lease.owner.clone(),
                duration_hours: lease.duration_hours,
                expires_at: lease.expires_at,
            });
        }

        Ok(leases)
    }

    async fn lease_started(&self, row: &AccountRow, manual: bool) -> LeaseResult<LeaseView> {
        let lease = Self::leased_view(row)?;

        info!(
            account_id = %lease.account_id,
            inventory_name = %lease.inventory_name,
            owner = %lease.owner,
            duration_hours = lease.duration_hours,
            manual,
            "Lease started"
        );

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::LeaseStarted {
                account_id: lease.account_id,
                owner: lease.owner.clone(),
                inventory_name: lease.inventory_name.clone(),
                duration_hours: lease.duration_hours,
                manual,
            }));

        self.notify_owner(&lease.owner, &notices::lease_started(&lease))
            .await;
        self.events.emit(CoreEvent::LeaseStarted {
            account_id: lease.account_id,
            inventory_name: lease.inventory_name.clone(),
            owner: lease.owner.clone(),
            expires_at: lease.expires_at,
        });

        Ok(lease)
    }

    fn leased_view(row: &AccountRow) -> LeaseResult<LeaseView> {
        row.to_lease_view()
            .ok_or_else(|| LeaseError::NotLeased(format!("account {}", row.id)))
    }

    /// Error for an operation that needed a leased row
    fn missing_lease(&self, account_id: AccountId) -> LeaseResult<LeaseError> {
        Ok(match self.store.get_account(account_id)? {
            Some(_) => LeaseError::NotLeased(format!("account {account_id}")),
            None => LeaseError::NotFound(format!("account {account_id}")),
        })
    }

    async fn notify_owner(&self, owner: &OwnerId, text: &str) {
        if let Err(e) = self.notifier.notify_owner(owner, text).await {
            warn!(owner = %owner, error = %e, "Failed to notify owner");
        }
    }

    // Queries

    pub fn list_free(&self) -> LeaseResult<Vec<AccountView>> {
        Ok(self.store.list_free()?.iter().map(AccountRow::to_view).collect())
    }

    pub fn list_all(&self) -> LeaseResult<Vec<AccountView>> {
        Ok(self
            .store
            .list_accounts()?
            .iter()
            .map(AccountRow::to_view)
            .collect())
    }

    pub fn stats(&self, now: DateTime<Utc>) -> LeaseResult<InventoryStats> {
        Ok(self.store.stats(now)?)
    }

    pub fn get_account(&self, account_id: AccountId) -> LeaseResult<AccountView> {
        self.store
            .get_account(account_id)?
            .map(|row| row.to_view())
            .ok_or_else(|| LeaseError::NotFound(format!("account {account_id}")))
    }

    /// Active leases of one owner, newest first
    pub fn leases_of(&self, owner: &OwnerId) -> LeaseResult<Vec<LeaseView>> {
        self.store
            .active_leases_for(owner)?
            .iter()
            .map(Self::leased_view)
            .collect()
    }

    // Inventory administration

    pub fn add_account(&self, spec: &NewAccountSpec) -> LeaseResult<Vec<AccountId>> {
        let names: Vec<&str> = spec
            .inventory_names
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            return Err(LeaseError::InvalidRequest(
                "at least one inventory name is required".into(),
            ));
        }
        if spec.login.trim().is_empty() || spec.secret.is_empty() {
            return Err(LeaseError::InvalidRequest(
                "login and secret cannot be empty".into(),
            ));
        }
        self.check_hours(spec.duration_hours)?;

        let normalized = NewAccountSpec {
            inventory_names: names.into_iter().map(String::from).collect(),
            login: spec.login.trim().to_string(),
            credential_ref: spec.credential_ref.clone(),
            secret: spec.secret.clone(),
            duration_hours: spec.duration_hours,
        };
        let ids = self.store.add_accounts(&normalized)?;

        info!(login = %normalized.login, count = ids.len(), "Accounts added");
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::AccountsAdded {
                login: normalized.login,
                account_ids: ids.clone(),
            }));

        Ok(ids)
    }

    /// Remove the whole sibling group of `account_id`
    pub fn delete_account(&self, account_id: AccountId) -> LeaseResult<usize> {
        let (login, removed) = self
            .store
            .delete_sibling_group(account_id)?
            .ok_or_else(|| LeaseError::NotFound(format!("account {account_id}")))?;

        info!(login = %login, removed, "Sibling group deleted");
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::AccountsDeleted { login, removed }));

        Ok(removed)
    }

    pub fn list_quarantined(&self) -> LeaseResult<Vec<QuarantineEntry>> {
        Ok(self.store.list_quarantined()?)
    }

    pub fn add_operator(&self, operator: &str) -> LeaseResult<()> {
        let operator = operator.trim();
        if operator.is_empty() {
            return Err(LeaseError::InvalidRequest("operator cannot be empty".into()));
        }
        if self.store.add_operator(operator)? {
            let _ = self
                .store
                .append_audit(AuditEvent::new(AuditEventType::OperatorAdded {
                    operator: operator.to_string(),
                }));
        }
        Ok(())
    }

    pub fn list_operators(&self) -> LeaseResult<Vec<String>> {
        Ok(self.store.list_operators()?)
    }
}
