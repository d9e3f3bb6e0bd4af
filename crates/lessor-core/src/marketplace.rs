//! Marketplace worker
//!
//! Drains the marketplace feed and handles each event in arrival order:
//! paid orders become leases, chat commands get answers, reviews earn
//! bonus hours.

use chrono::{DateTime, Utc};
use lessor_api::MarketplaceEvent;
use lessor_config::MarketplaceConfig;
use lessor_gateway_api::{MarketplaceFeed, Notifier};
use lessor_store::Store;
use lessor_util::OwnerId;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::{
    Allocation, AllocationEngine, GuardCodeGenerator, LeaseError, LeaseResult, match_inventory,
    notices,
};

/// What became of one marketplace event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Not about anything we lease, or not a command we know
    Ignored,
    /// Order turned into a new lease or extended an existing one
    Leased,
    /// Order matched a lot with no free account
    Unavailable,
    /// Order asked for more hours than a lease may run
    Refused,
    /// Chat command answered
    Replied,
    /// Review extended the buyer's leases
    Credited,
}

pub struct MarketplaceWorker {
    engine: Arc<AllocationEngine>,
    guard: Arc<GuardCodeGenerator>,
    notifier: Arc<dyn Notifier>,
    feed: Arc<dyn MarketplaceFeed>,
    config: MarketplaceConfig,
}

impl MarketplaceWorker {
    pub fn new(
        engine: Arc<AllocationEngine>,
        guard: Arc<GuardCodeGenerator>,
        notifier: Arc<dyn Notifier>,
        feed: Arc<dyn MarketplaceFeed>,
        config: MarketplaceConfig,
    ) -> Self {
        Self {
            engine,
            guard,
            notifier,
            feed,
            config,
        }
    }

    fn store(&self) -> &Arc<dyn Store> {
        self.engine.store()
    }

    /// Handle a single event. Conflicts are answered here; other errors are
    /// returned to the caller.
    pub async fn handle_event(
        &self,
        event: MarketplaceEvent,
        now: DateTime<Utc>,
    ) -> LeaseResult<EventOutcome> {
        match event {
            MarketplaceEvent::NewOrder {
                order_id,
                buyer,
                description,
                quantity,
            } => self.handle_order(&order_id, &buyer, &description, quantity, now).await,
            MarketplaceEvent::NewMessage {
                author,
                text,
                viewing,
            } => self.handle_message(&author, &text, viewing.as_deref(), now).await,
            MarketplaceEvent::NewFeedback { text } => self.handle_feedback(&text, now).await,
        }
    }

    async fn handle_order(
        &self,
        order_id: &str,
        buyer: &OwnerId,
        description: &str,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> LeaseResult<EventOutcome> {
        let names = self.store().inventory_names(false)?;
        let Some(name) = match_inventory(description, &names) else {
            debug!(order_id, "Order does not match any lot, skipping");
            return Ok(EventOutcome::Ignored);
        };

        info!(order_id, buyer = %buyer, inventory_name = name, quantity, "Processing order");

        let hours = quantity.max(1);
        match self.engine.allocate(name, buyer, hours, now).await {
            Ok(allocation) => {
                if quantity > 1 {
                    self.notify_owner(buyer, &notices::quantity_as_hours(name, quantity))
                        .await;
                }
                if let Allocation::Started(lease) = &allocation {
                    self.notify_admin(&notices::admin_lease_started(lease)).await;
                }
                Ok(EventOutcome::Leased)
            }
            Err(LeaseError::Conflict(_)) => {
                self.notify_owner(buyer, &notices::unavailable(name)).await;
                self.notify_admin(&notices::admin_unavailable(order_id, buyer, name))
                    .await;
                Ok(EventOutcome::Unavailable)
            }
            Err(LeaseError::InvalidRequest(reason)) => {
                warn!(order_id, buyer = %buyer, reason = %reason, "Order refused");
                self.notify_admin(&notices::admin_order_refused(order_id, buyer, &reason))
                    .await;
                Ok(EventOutcome::Refused)
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_message(
        &self,
        author: &OwnerId,
        text: &str,
        viewing: Option<&str>,
        now: DateTime<Utc>,
    ) -> LeaseResult<EventOutcome> {
        let command = text.trim();

        if command == self.config.code_command {
            let reply = self.guard_codes_for(author, now).await?;
            self.notify_owner(author, &reply).await;
        } else if command == self.config.operator_command {
            info!(author = %author, "Operator requested");
            self.notify_admin(&notices::admin_operator_request(author)).await;
            self.notify_owner(author, notices::OPERATOR_ACK).await;
        } else if command == self.config.stock_command {
            let reply = self.stock_reply(viewing)?;
            self.notify_owner(author, &reply).await;
        } else {
            return Ok(EventOutcome::Ignored);
        }

        Ok(EventOutcome::Replied)
    }

    async fn guard_codes_for(&self, owner: &OwnerId, now: DateTime<Utc>) -> LeaseResult<String> {
        let leases = self.store().active_leases_for(owner)?;
        if leases.is_empty() {
            return Ok(notices::NO_ACTIVE_LEASE.to_string());
        }

        let mut lines = Vec::with_capacity(leases.len());
        for row in &leases {
            match self.guard.code_for(&row.credential_ref, now).await {
                Ok(code) => lines.push(notices::guard_code_line(row.id, &code)),
                Err(e) => {
                    warn!(account_id = %row.id, error = %e, "Guard code unavailable");
                    return Ok(notices::GUARD_CODE_UNAVAILABLE.to_string());
                }
            }
        }
        Ok(lines.join("\n"))
    }

    fn stock_reply(&self, viewing: Option<&str>) -> LeaseResult<String> {
        let names = self.store().inventory_names(false)?;
        let Some(name) = viewing.and_then(|listing| match_inventory(listing, &names)) else {
            return Ok(notices::STOCK_UNKNOWN.to_string());
        };
        let (free, total) = self.store().count_by_name(name)?;
        Ok(notices::stock(name, free, total))
    }

    async fn handle_feedback(&self, text: &str, now: DateTime<Utc>) -> LeaseResult<EventOutcome> {
        let Some(buyer) = feedback_buyer(text, &self.config.feedback_buyer_marker) else {
            debug!("Review text names no buyer, skipping");
            return Ok(EventOutcome::Ignored);
        };

        let extended = self.engine.credit_review(&buyer, now).await?;
        if extended.is_empty() {
            Ok(EventOutcome::Ignored)
        } else {
            Ok(EventOutcome::Credited)
        }
    }

    /// Poll the feed and handle events one at a time until shutdown
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.poll_delay);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            poll_delay_secs = self.config.poll_delay.as_secs(),
            "Marketplace worker started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Marketplace worker stopping");
                        break;
                    }
                }
            }
        }
    }

    /// Drain whatever the feed has right now
    pub async fn poll_once(&self) -> usize {
        let events = match self.feed.poll().await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Marketplace poll failed");
                return 0;
            }
        };

        let count = events.len();
        for event in events {
            if let Err(e) = self.handle_event(event, lessor_util::now()).await {
                warn!(error = %e, "Marketplace event failed");
            }
        }
        count
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

/// Buyer named by a review notice: the first word after `marker`
pub fn feedback_buyer(text: &str, marker: &str) -> Option<OwnerId> {
    let (_, rest) = text.split_once(marker)?;
    let word = rest
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '-');
    if word.is_empty() {
        None
    } else {
        Some(OwnerId::new(word))
    }
}
