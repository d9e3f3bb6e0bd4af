//! Integration tests for lessord
//!
//! These tests drive the engine, marketplace worker and expiry sweeper
//! together against one store, the way the daemon wires them.

use chrono::{DateTime, Duration, TimeZone, Utc};
use lessor_api::{LeaseTarget, MarketplaceEvent, NewAccountSpec};
use lessor_config::{SecretEncoding, Settings, parse_config};
use lessor_core::{
    AllocationEngine, CoreEvent, CredentialRotator, EventOutcome, EventSink, ExpirySweeper,
    GuardCodeGenerator, LeaseError, MarketplaceWorker,
};
use lessor_gateway::QueuedFeed;
use lessor_gateway_api::{FixedSkew, MockCredentials, MockNotifier, MockSecretChanger};
use lessor_store::{SqliteStore, Store};
use lessor_util::OwnerId;
use std::sync::Arc;
use tokio::sync::mpsc;

struct Daemon {
    store: Arc<dyn Store>,
    notifier: Arc<MockNotifier>,
    changer: Arc<MockSecretChanger>,
    engine: Arc<AllocationEngine>,
    sweeper: ExpirySweeper,
    marketplace: MarketplaceWorker,
    events: mpsc::UnboundedReceiver<CoreEvent>,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
}

fn daemon_with(store: Arc<dyn Store>, settings: &Settings) -> Daemon {
    let notifier = Arc::new(MockNotifier::new());
    let changer = Arc::new(MockSecretChanger::new());
    let (tx, events) = mpsc::unbounded_channel();
    let sink = EventSink::new(tx);

    let engine = Arc::new(
        AllocationEngine::new(store.clone(), notifier.clone(), settings.leasing.clone())
            .with_events(sink.clone()),
    );
    let sweeper = ExpirySweeper::new(
        store.clone(),
        Arc::new(CredentialRotator::new(changer.clone(), &settings.rotation)),
        notifier.clone(),
        settings.expiry.clone(),
    )
    .with_events(sink);
    let guard = Arc::new(GuardCodeGenerator::new(
        Arc::new(FixedSkew::new(0)),
        Arc::new(MockCredentials::new().with_secret("rust1.maFile", "MTIzNDU2Nzg5MDEyMzQ1Njc4OTA=")),
        SecretEncoding::Base64,
    ));
    let (_sender, feed) = QueuedFeed::channel();
    let marketplace = MarketplaceWorker::new(
        engine.clone(),
        guard,
        notifier.clone(),
        Arc::new(feed),
        settings.marketplace.clone(),
    );

    Daemon {
        store,
        notifier,
        changer,
        engine,
        sweeper,
        marketplace,
        events,
    }
}

fn daemon() -> Daemon {
    daemon_with(
        Arc::new(SqliteStore::in_memory().unwrap()),
        &Settings::default(),
    )
}

fn add_group(engine: &AllocationEngine, names: &[&str], login: &str) {
    engine
        .add_account(&NewAccountSpec {
            inventory_names: names.iter().map(|n| n.to_string()).collect(),
            login: login.into(),
            credential_ref: format!("{login}.maFile"),
            secret: "initial-pw".into(),
            duration_hours: 1,
        })
        .unwrap();
}

fn order(buyer: &str, description: &str, quantity: u32) -> MarketplaceEvent {
    MarketplaceEvent::NewOrder {
        order_id: format!("ORD-{buyer}"),
        buyer: OwnerId::new(buyer),
        description: description.into(),
        quantity,
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

#[tokio::test]
async fn test_full_rental_lifecycle() {
    let mut d = daemon();
    add_group(&d.engine, &["Rust", "Rust Console Edition"], "rust1");
    let alice = OwnerId::new("alice");

    // Paid order for two hours
    let outcome = d
        .marketplace
        .handle_event(order("alice", "Rust - rent 1 hour, instant delivery", 2), t0())
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Leased);

    let lease = d.engine.leases_of(&alice).unwrap().remove(0);
    assert_eq!(lease.inventory_name, "Rust");
    assert_eq!(lease.duration_hours, 2);
    // Starts ten minutes after the order
    assert_eq!(lease.started_at, t0() + Duration::minutes(10));

    // Sibling is off the market while alice plays
    assert!(d.engine.list_free().unwrap().is_empty());

    // Guard code on request
    d.notifier.clear();
    d.marketplace
        .handle_event(
            MarketplaceEvent::NewMessage {
                author: alice.clone(),
                text: "/code".into(),
                viewing: None,
            },
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(
        d.notifier.sent_to(&alice),
        vec![format!("ID {} -> R87JJ", lease.account_id)]
    );

    // Review earns a bonus hour
    d.marketplace
        .handle_event(
            MarketplaceEvent::NewFeedback {
                text: "Buyer alice has left a 5-star review".into(),
            },
            t0(),
        )
        .await
        .unwrap();
    let lease = d.engine.leases_of(&alice).unwrap().remove(0);
    assert_eq!(lease.duration_hours, 3);
    let expiry = lease.expires_at;

    // Warning inside the window, nothing rotated yet
    let report = d.sweeper.run_cycle(expiry - Duration::minutes(10)).await;
    assert_eq!(report.warned, 1);
    assert_eq!(d.changer.call_count(), 0);

    // Expiry rotates once and frees the whole group
    let report = d.sweeper.run_cycle(expiry + Duration::seconds(30)).await;
    assert_eq!(report.rotated, 1);
    let report = d.sweeper.run_cycle(expiry + Duration::seconds(90)).await;
    assert_eq!(report.rotated, 0);
    assert_eq!(d.changer.call_count(), 1);

    let free = d.engine.list_free().unwrap();
    assert_eq!(free.len(), 2);
    let (_, new_secret) = d.changer.changes().remove(0);
    for row in d.store.list_accounts().unwrap() {
        assert_eq!(row.secret, new_secret);
        assert_eq!(row.lease_duration_hours, 1);
    }

    let kinds: Vec<&'static str> = drain(&mut d.events)
        .iter()
        .map(|e| match e {
            CoreEvent::LeaseStarted { .. } => "started",
            CoreEvent::LeaseExtended { .. } => "extended",
            CoreEvent::LeaseReleased { .. } => "released",
            CoreEvent::ExpiryWarning { .. } => "warning",
            CoreEvent::AccountRotated { .. } => "rotated",
            CoreEvent::RotationQuarantined { .. } => "quarantined",
        })
        .collect();
    assert_eq!(kinds, vec!["started", "extended", "warning", "rotated"]);
}

#[tokio::test]
async fn test_repeat_order_extends_instead_of_duplicating() {
    let d = daemon();
    add_group(&d.engine, &["Rust"], "rust1");
    add_group(&d.engine, &["Rust"], "rust2");
    let bob = OwnerId::new("bob");

    d.marketplace
        .handle_event(order("bob", "Rust", 1), t0())
        .await
        .unwrap();
    d.marketplace
        .handle_event(order("bob", "Rust", 1), t0() + Duration::minutes(20))
        .await
        .unwrap();

    let leases = d.engine.leases_of(&bob).unwrap();
    assert_eq!(leases.len(), 1);
    assert_eq!(leases[0].duration_hours, 2);
    assert_eq!(d.engine.list_free().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_command_handler_and_worker_race_for_last_unit() {
    for _ in 0..100 {
        let d = daemon();
        add_group(&d.engine, &["Rust"], "rust1");
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let engine = d.engine.clone();
        let admin_barrier = barrier.clone();
        let admin_side = tokio::spawn(async move {
            admin_barrier.wait().await;
            engine
                .allocate("Rust", &OwnerId::new("carol"), 1, t0())
                .await
        });
        barrier.wait().await;
        let worker_outcome = d
            .marketplace
            .handle_event(order("dave", "Rust", 1), t0())
            .await;

        let admin_won = admin_side.await.unwrap().is_ok();
        let worker_won = worker_outcome.unwrap() == EventOutcome::Leased;

        assert!(admin_won ^ worker_won, "exactly one claim must win");
        assert_eq!(d.store.list_active_leases().unwrap().len(), 1);
    }
}

#[tokio::test]
async fn test_oversized_order_is_refused_and_sweeps_continue() {
    let d = daemon();
    add_group(&d.engine, &["Rust"], "rust1");
    add_group(&d.engine, &["Dota"], "dota1");

    let outcome = d
        .marketplace
        .handle_event(order("mallory", "Rust", u32::MAX), t0())
        .await
        .unwrap();
    assert_eq!(outcome, EventOutcome::Refused);
    assert!(d.engine.leases_of(&OwnerId::new("mallory")).unwrap().is_empty());

    let lease = d
        .engine
        .allocate("Dota", &OwnerId::new("nina"), 1, t0())
        .await
        .unwrap()
        .into_lease();
    let err = d
        .engine
        .extend(&LeaseTarget::Account { account_id: lease.account_id }, u32::MAX)
        .await
        .unwrap_err();
    assert!(matches!(err, LeaseError::InvalidRequest(_)));

    let report = d.sweeper.run_cycle(lease.expires_at + Duration::minutes(1)).await;
    assert_eq!(report.rotated, 1);
    assert_eq!(report.errors, 0);
}

#[tokio::test]
async fn test_extend_requires_active_lease() {
    let d = daemon();
    add_group(&d.engine, &["Rust"], "rust1");

    let err = d
        .engine
        .extend(
            &LeaseTarget::Owner {
                owner: OwnerId::new("erin"),
                inventory_name: "Rust".into(),
            },
            2,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, LeaseError::NotLeased(_)));
    assert!(d.store.list_active_leases().unwrap().is_empty());
}

#[tokio::test]
async fn test_quarantine_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("lessord.db");
    let settings = Settings::default();

    let account_id = {
        let d = daemon_with(Arc::new(SqliteStore::open(&db_path).unwrap()), &settings);
        add_group(&d.engine, &["Rust"], "rust1");
        let lease = d
            .engine
            .allocate("Rust", &OwnerId::new("frank"), 1, t0())
            .await
            .unwrap()
            .into_lease();

        d.changer.set_fail(true);
        let report = d.sweeper.run_cycle(t0() + Duration::hours(2)).await;
        assert_eq!(report.quarantined, 1);
        lease.account_id
    };

    // Fresh process, same database: no retry against the provider
    let d = daemon_with(Arc::new(SqliteStore::open(&db_path).unwrap()), &settings);
    let report = d.sweeper.run_cycle(t0() + Duration::hours(3)).await;
    assert_eq!(report.skipped, 1);
    assert_eq!(d.changer.call_count(), 0);

    let quarantined = d.engine.list_quarantined().unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].account_id, account_id);

    // Manual rotation is the way out
    d.sweeper.rotate_now(account_id).await.unwrap();
    assert!(d.engine.list_quarantined().unwrap().is_empty());
}

#[tokio::test]
async fn test_configured_timings_flow_through() {
    let settings = parse_config(
        r#"
config_version = 1

[leasing]
lease_start_offset_minutes = 0
review_bonus_hours = 2

[expiry]
warn_min_minutes = 1
warn_max_minutes = 3
"#,
    )
    .unwrap();
    let d = daemon_with(Arc::new(SqliteStore::in_memory().unwrap()), &settings);
    add_group(&d.engine, &["Rust"], "rust1");
    let gina = OwnerId::new("gina");

    let lease = d
        .engine
        .allocate("Rust", &gina, 1, t0())
        .await
        .unwrap()
        .into_lease();
    assert_eq!(lease.started_at, t0());

    // Default window would warn at 10 minutes left; this one does not
    let report = d.sweeper.run_cycle(t0() + Duration::minutes(50)).await;
    assert_eq!(report.warned, 0);
    let report = d.sweeper.run_cycle(t0() + Duration::minutes(58)).await;
    assert_eq!(report.warned, 1);

    let extended = d.engine.credit_review(&gina, t0()).await.unwrap();
    assert_eq!(extended[0].duration_hours, 3);
}
