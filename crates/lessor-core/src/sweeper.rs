//! Expiry sweeper
//!
//! Periodically walks every active lease. Leases inside the warning window
//! get a warning (on every pass while inside it); expired leases have their
//! sibling group's secret rotated and are returned to the free pool. A
//! failed rotation quarantines the row so it is not retried until an
//! administrator rotates it by hand.

use chrono::{DateTime, Utc};
use lessor_config::ExpiryConfig;
use lessor_gateway_api::Notifier;
use lessor_store::{AccountRow, AuditEvent, AuditEventType, RotationCommit, Store};
use lessor_util::{AccountId, OwnerId};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::{CoreEvent, CredentialRotator, EventSink, LeaseError, LeaseResult, notices};

/// Tally of one sweep pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub warned: usize,
    pub rotated: usize,
    pub quarantined: usize,
    /// Expired but already quarantined
    pub skipped: usize,
    pub errors: usize,
}

impl SweepReport {
    fn is_quiet(&self) -> bool {
        *self == SweepReport::default()
    }
}

enum ExpireOutcome {
    Rotated,
    Quarantined,
    Skipped,
}

pub struct ExpirySweeper {
    store: Arc<dyn Store>,
    rotator: Arc<CredentialRotator>,
    notifier: Arc<dyn Notifier>,
    expiry: ExpiryConfig,
    events: EventSink,
}

impl ExpirySweeper {
    pub fn new(
        store: Arc<dyn Store>,
        rotator: Arc<CredentialRotator>,
        notifier: Arc<dyn Notifier>,
        expiry: ExpiryConfig,
    ) -> Self {
        Self {
            store,
            rotator,
            notifier,
            expiry,
            events: EventSink::disabled(),
        }
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Run one pass over all active leases.
    ///
    /// Per-row failures are logged and counted; they never abort the pass.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let leases = match self.store.list_active_leases() {
            Ok(leases) => leases,
            Err(e) => {
                error!(error = %e, "Failed to load active leases");
                report.errors += 1;
                return report;
            }
        };

        for row in &leases {
            let Some(remaining) = row.remaining(now) else {
                continue;
            };

            if remaining <= chrono::Duration::zero() {
                match self.expire(row, now).await {
                    Ok(ExpireOutcome::Rotated) => report.rotated += 1,
                    Ok(ExpireOutcome::Quarantined) => report.quarantined += 1,
                    Ok(ExpireOutcome::Skipped) => report.skipped += 1,
                    Err(e) => {
                        error!(account_id = %row.id, error = %e, "Expiry handling failed");
                        report.errors += 1;
                    }
                }
            } else if self.expiry.in_warning_window(remaining) {
                self.warn_expiring(row, remaining).await;
                report.warned += 1;
            }
        }

        report
    }

    async fn warn_expiring(&self, row: &AccountRow, remaining: chrono::Duration) {
        let Some(owner) = row.owner() else {
            return;
        };

        info!(
            account_id = %row.id,
            owner = %owner,
            remaining_minutes = remaining.num_minutes(),
            "Lease expiring soon"
        );

        self.notify_owner(
            owner,
            &notices::expiry_warning_owner(row.id, &row.inventory_name, remaining),
        )
        .await;
        self.notify_admin(&notices::expiry_warning_admin(row.id, owner, remaining))
            .await;
        self.events.emit(CoreEvent::ExpiryWarning {
            account_id: row.id,
            owner: owner.clone(),
            remaining,
        });
    }

    async fn expire(&self, row: &AccountRow, now: DateTime<Utc>) -> LeaseResult<ExpireOutcome> {
        if self.store.is_quarantined(row.id)? {
            debug!(account_id = %row.id, "Expired lease is quarantined, skipping");
            return Ok(ExpireOutcome::Skipped);
        }
        let owner = row
            .owner()
            .cloned()
            .ok_or_else(|| LeaseError::NotLeased(format!("account {}", row.id)))?;

        info!(account_id = %row.id, login = %row.login, owner = %owner, "Lease expired, rotating");

        let new_secret = match self.rotator.rotate(&row.credential_ref, &row.secret).await {
            Ok(secret) => secret,
            Err(e) => {
                self.quarantine(row, &e.to_string(), now).await?;
                return Ok(ExpireOutcome::Quarantined);
            }
        };

        let commit = match self.store.complete_rotation(
            row,
            &new_secret,
            self.expiry.reset_duration_hours,
        ) {
            Ok(commit) => commit,
            Err(e) => {
                self.notify_admin(&notices::admin_rotation_unsaved(
                    &row.login,
                    &new_secret,
                    &e.to_string(),
                ))
                .await;
                return Err(e.into());
            }
        };

        if let RotationCommit::LeaseChanged(_) = commit {
            // Released, re-let or extended while the provider call ran
            info!(account_id = %row.id, login = %row.login, "Lease changed during rotation, kept");
            let _ = self
                .store
                .append_audit(AuditEvent::new(AuditEventType::SecretRotated {
                    login: row.login.clone(),
                    released: false,
                }));
            self.notify_holder(&row.login, &new_secret).await?;
            return Ok(ExpireOutcome::Rotated);
        }

        info!(account_id = %row.id, login = %row.login, "Account rotated and returned to pool");

        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::SecretRotated {
                login: row.login.clone(),
                released: true,
            }));

        self.notify_owner(&owner, &notices::lease_ended(row.id, &row.inventory_name))
            .await;
        self.notify_admin(&notices::admin_rotated(&row.login, row.id, &owner))
            .await;
        self.events.emit(CoreEvent::AccountRotated {
            account_id: row.id,
            login: row.login.clone(),
        });

        Ok(ExpireOutcome::Rotated)
    }

    async fn quarantine(&self, row: &AccountRow, reason: &str, now: DateTime<Utc>) -> LeaseResult<()> {
        warn!(account_id = %row.id, login = %row.login, reason, "Rotation failed, quarantining");

        self.store.quarantine(row.id, reason, now)?;
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::RotationFailed {
                account_id: row.id,
                reason: reason.to_string(),
            }));

        self.notify_admin(&notices::admin_rotation_failed(&row.login, row.id, reason))
            .await;
        self.events.emit(CoreEvent::RotationQuarantined {
            account_id: row.id,
            reason: reason.to_string(),
        });

        Ok(())
    }

    /// Rotate the secret of `account_id`'s sibling group without releasing
    /// it. Clears any quarantine on the group, so an expired lease is
    /// picked up again by the next sweep.
    pub async fn rotate_now(&self, account_id: AccountId) -> LeaseResult<()> {
        let row = self
            .store
            .get_account(account_id)?
            .ok_or_else(|| LeaseError::NotFound(format!("account {account_id}")))?;

        let new_secret = self.rotator.rotate(&row.credential_ref, &row.secret).await?;
        if let Err(e) = self.store.replace_group_secret(&row.login, &new_secret) {
            self.notify_admin(&notices::admin_rotation_unsaved(
                &row.login,
                &new_secret,
                &e.to_string(),
            ))
            .await;
            return Err(e.into());
        }

        info!(account_id = %account_id, login = %row.login, "Secret rotated on request");
        let _ = self
            .store
            .append_audit(AuditEvent::new(AuditEventType::SecretRotated {
                login: row.login.clone(),
                released: false,
            }));

        self.notify_holder(&row.login, &new_secret).await
    }

    /// Send a replaced secret to whoever holds the group right now
    async fn notify_holder(&self, login: &str, new_secret: &str) -> LeaseResult<()> {
        if let Some((leased_id, owner)) = self.group_holder(login)? {
            self.notify_owner(&owner, &notices::secret_replaced(leased_id, login, new_secret))
                .await;
        }
        Ok(())
    }

    fn group_holder(&self, login: &str) -> LeaseResult<Option<(AccountId, OwnerId)>> {
        Ok(self
            .store
            .list_active_leases()?
            .into_iter()
            .find(|r| r.login == login)
            .and_then(|r| r.owner().cloned().map(|owner| (r.id, owner))))
    }

    /// Sweep on a fixed interval until shutdown is signalled
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.expiry.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.expiry.sweep_interval.as_secs(),
            "Expiry sweeper started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_cycle(lessor_util::now()).await;
                    if !report.is_quiet() {
                        info!(
                            warned = report.warned,
                            rotated = report.rotated,
                            quarantined = report.quarantined,
                            skipped = report.skipped,
                            errors = report.errors,
                            "Expiry sweep finished"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Expiry sweeper stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn notify_owner(&self, owner: &OwnerId, text: &str) {
        if let Err(e) = self.notifier.notify_owner(owner, text).await {
            warn!(owner = %owner, error = %e, "Failed to notify owner");
        }
    }

    async fn notify_admin(&self, text: &str) {
        if let Err(e) = self.notifier.notify_admin(text).await {
            warn!(error = %e, "Failed to notify administrator");
        }
    }
}
