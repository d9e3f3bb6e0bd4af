//! lessord - The lessor background service
//!
//! This is the main entry point for the lessord service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Allocation engine, expiry sweeper and marketplace worker
//! - Gateway adapters (clock skew, secret changes, notifications)
//! - IPC server

use anyhow::{Context, Result};
use clap::Parser;
use lessor_api::{
    ClientRole, Command, ErrorCode, ErrorInfo, Event, EventPayload, HealthStatus, Response,
    ResponsePayload,
};
use lessor_config::{Settings, load_config};
use lessor_core::{
    AllocationEngine, CoreEvent, CredentialRotator, EventSink, ExpirySweeper, GuardCodeGenerator,
    LeaseError, MarketplaceWorker,
};
use lessor_gateway::{
    CommandSecretChanger, FeedSender, HttpSkewSource, LogNotifier, MaFileCredentials, QueuedFeed,
    WebhookNotifier,
};
use lessor_gateway_api::Notifier;
use lessor_ipc::{IpcServer, ServerMessage};
use lessor_store::{AuditEvent, AuditEventType, SqliteStore, Store};
use lessor_util::{ClientId, default_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Credential files live here, under the data directory
const CREDENTIALS_SUBDIR: &str = "mafiles";

/// How long workers get to finish their current pass on shutdown
const WORKER_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// lessord - Marketplace account leasing service
#[derive(Parser, Debug)]
#[command(name = "lessord")]
#[command(about = "Marketplace account leasing with automatic credential rotation", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/lessor/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set LESSOR_SOCKET env var)
    #[arg(short, long, env = "LESSOR_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set LESSOR_DATA_DIR env var)
    #[arg(short, long, env = "LESSOR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Everything a request handler needs, shared across tasks
#[derive(Clone)]
struct Shared {
    store: Arc<dyn Store>,
    engine: Arc<AllocationEngine>,
    sweeper: Arc<ExpirySweeper>,
    feed: FeedSender,
    ipc: Arc<IpcServer>,
}

/// Main service state
struct Service {
    ctx: Shared,
    marketplace: Arc<MarketplaceWorker>,
    core_events: mpsc::UnboundedReceiver<CoreEvent>,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let settings = load_config(&args.config)
            .with_context(|| format!("Failed to load config from {:?}", args.config))?;

        info!(config_path = %args.config.display(), "Configuration loaded");

        let socket_path = args
            .socket
            .clone()
            .unwrap_or_else(|| settings.service.socket_path.clone());

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| settings.service.data_dir.clone());

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let db_path = data_dir.join("lessord.db");
        let store: Arc<dyn Store> = Arc::new(
            SqliteStore::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?,
        );

        info!(db_path = %db_path.display(), "Store initialized");

        store.append_audit(AuditEvent::new(AuditEventType::ServiceStarted))?;

        let (event_tx, core_events) = mpsc::unbounded_channel();
        let events = EventSink::new(event_tx);

        let notifier = build_notifier(&settings)?;

        let engine = Arc::new(
            AllocationEngine::new(store.clone(), notifier.clone(), settings.leasing.clone())
                .with_events(events.clone()),
        );

        if settings.rotation.change_command.is_empty() {
            warn!("No secret change helper configured, every rotation will fail");
        }
        let rotator = Arc::new(CredentialRotator::new(
            Arc::new(CommandSecretChanger::new(
                settings.rotation.change_command.clone(),
            )),
            &settings.rotation,
        ));
        let sweeper = Arc::new(
            ExpirySweeper::new(
                store.clone(),
                rotator,
                notifier.clone(),
                settings.expiry.clone(),
            )
            .with_events(events),
        );

        let credentials_dir = data_dir.join(CREDENTIALS_SUBDIR);
        let guard = Arc::new(GuardCodeGenerator::new(
            Arc::new(
                HttpSkewSource::new(settings.guard.time_url.clone(), settings.guard.time_timeout)
                    .context("Failed to set up clock skew source")?,
            ),
            Arc::new(MaFileCredentials::new(credentials_dir.clone())),
            settings.guard.secret_encoding,
        ));
        debug!(path = %credentials_dir.display(), "Credential files directory");

        let (feed, queued) = QueuedFeed::channel();
        let marketplace = Arc::new(MarketplaceWorker::new(
            engine.clone(),
            guard,
            notifier,
            Arc::new(queued),
            settings.marketplace.clone(),
        ));

        let mut ipc = IpcServer::new(&socket_path);
        ipc.start().await?;

        info!(socket_path = %socket_path.display(), "IPC server started");

        Ok(Self {
            ctx: Shared {
                store,
                engine,
                sweeper,
                feed,
                ipc: Arc::new(ipc),
            },
            marketplace,
            core_events,
        })
    }

    async fn run(mut self) -> Result<()> {
        let ctx = self.ctx.clone();
        let mut ipc_messages = ctx
            .ipc
            .take_message_receiver()
            .await
            .context("IPC message receiver already taken")?;

        let ipc_accept = ctx.ipc.clone();
        tokio::spawn(async move {
            if let Err(e) = ipc_accept.run().await {
                error!(error = %e, "IPC server error");
            }
        });

        // Background workers
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper_handle = {
            let sweeper = ctx.sweeper.clone();
            let shutdown = shutdown_rx.clone();
            tokio::spawn(async move { sweeper.run(shutdown).await })
        };
        let marketplace_handle = {
            let marketplace = self.marketplace.clone();
            let shutdown = shutdown_rx;
            tokio::spawn(async move { marketplace.run(shutdown).await })
        };

        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup())
            .context("Failed to create SIGHUP handler")?;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                // Lifecycle events from the engine and sweeper
                Some(event) = self.core_events.recv() => {
                    ctx.ipc.broadcast_event(Event::new(event_payload(event)));
                }

                Some(msg) = ipc_messages.recv() => {
                    Self::handle_ipc_message(&ctx, msg);
                }
            }
        }

        info!("Shutting down lessord");

        ctx.ipc.broadcast_event(Event::new(EventPayload::Shutdown));
        let _ = shutdown_tx.send(true);

        for (name, handle) in [("sweeper", sweeper_handle), ("marketplace", marketplace_handle)] {
            match tokio::time::timeout(WORKER_STOP_TIMEOUT, handle).await {
                Ok(Ok(())) => debug!(worker = name, "Worker stopped"),
                Ok(Err(e)) => warn!(worker = name, error = %e, "Worker panicked"),
                Err(_) => warn!(worker = name, "Worker did not stop in time"),
            }
        }

        if let Err(e) = ctx
            .store
            .append_audit(AuditEvent::new(AuditEventType::ServiceStopped))
        {
            warn!(error = %e, "Failed to log service shutdown");
        }

        ctx.ipc.shutdown();
        info!("Shutdown complete");
        Ok(())
    }

    fn handle_ipc_message(ctx: &Shared, msg: ServerMessage) {
        match msg {
            ServerMessage::Request { client_id, request } => {
                // Commands can wait on the network; never block the main loop
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let response =
                        handle_command(&ctx, &client_id, request.request_id, request.command).await;
                    let _ = ctx.ipc.send_response(&client_id, response).await;
                });
            }

            ServerMessage::ClientConnected { client_id, info } => {
                info!(
                    client_id = %client_id,
                    role = ?info.role,
                    uid = ?info.uid,
                    "Client connected"
                );

                let _ = ctx.store.append_audit(AuditEvent::new(
                    AuditEventType::ClientConnected {
                        client_id: client_id.to_string(),
                        role: format!("{:?}", info.role),
                        uid: info.uid,
                    },
                ));
            }

            ServerMessage::ClientDisconnected { client_id } => {
                debug!(client_id = %client_id, "Client disconnected");

                let _ = ctx.store.append_audit(AuditEvent::new(
                    AuditEventType::ClientDisconnected {
                        client_id: client_id.to_string(),
                    },
                ));
            }
        }
    }
}

fn build_notifier(settings: &Settings) -> Result<Arc<dyn Notifier>> {
    match &settings.notify.webhook_url {
        Some(url) => {
            info!(url = %url, "Delivering notifications via webhook");
            Ok(Arc::new(
                WebhookNotifier::new(url.clone(), settings.notify.admin_id.clone())
                    .context("Failed to set up webhook notifier")?,
            ))
        }
        None => {
            warn!("No webhook configured, notifications are only logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

async fn handle_command(
    ctx: &Shared,
    client_id: &ClientId,
    request_id: u64,
    command: Command,
) -> Response {
    let role = ctx
        .ipc
        .get_client_info(client_id)
        .await
        .map(|info| info.role)
        .unwrap_or(ClientRole::Bridge);

    if command.requires_admin() && !role.can_administer() {
        return Response::error(
            request_id,
            ErrorInfo::new(ErrorCode::PermissionDenied, "Admin role required"),
        );
    }

    let now = lessor_util::now();
    let engine = &ctx.engine;

    let result: Result<ResponsePayload, LeaseError> = match command {
        Command::Allocate {
            inventory_name,
            owner,
            duration_hours,
        } => engine
            .allocate(&inventory_name, &owner, duration_hours, now)
            .await
            .map(|allocation| ResponsePayload::Lease(allocation.into_lease())),

        Command::Extend { target, hours } => engine
            .extend(&target, hours)
            .await
            .map(ResponsePayload::Lease),

        Command::Release { account_id } => engine
            .release(account_id)
            .await
            .map(|()| ResponsePayload::Released),

        Command::ManualAssign { account_id, owner } => engine
            .manual_assign(account_id, &owner, now)
            .await
            .map(ResponsePayload::Lease),

        Command::ListFree => engine
            .list_free()
            .map(|accounts| ResponsePayload::Accounts { accounts }),

        Command::ListAll => engine
            .list_all()
            .map(|accounts| ResponsePayload::Accounts { accounts }),

        Command::Stats => engine.stats(now).map(ResponsePayload::Stats),

        Command::GetAccount { account_id } => {
            engine.get_account(account_id).map(ResponsePayload::Account)
        }

        Command::LeasesOf { owner } => engine
            .leases_of(&owner)
            .map(|leases| ResponsePayload::Leases { leases }),

        Command::AddAccount(spec) => engine
            .add_account(&spec)
            .map(|account_ids| ResponsePayload::AccountsAdded { account_ids }),

        Command::DeleteAccount { account_id } => engine
            .delete_account(account_id)
            .map(|removed| ResponsePayload::Deleted { removed }),

        Command::RotateNow { account_id } => ctx
            .sweeper
            .rotate_now(account_id)
            .await
            .map(|()| ResponsePayload::Rotated { account_id }),

        Command::ListQuarantined => engine
            .list_quarantined()
            .map(|entries| ResponsePayload::Quarantined { entries }),

        Command::AddOperator { operator } => engine
            .add_operator(&operator)
            .map(|()| ResponsePayload::OperatorAdded),

        Command::ListOperators => engine
            .list_operators()
            .map(|operators| ResponsePayload::Operators { operators }),

        Command::SubmitEvent { event } => match ctx.feed.submit(event) {
            Ok(()) => Ok(ResponsePayload::EventQueued),
            Err(e) => {
                return Response::error(
                    request_id,
                    ErrorInfo::new(ErrorCode::InternalError, e.to_string()),
                );
            }
        },

        Command::SubscribeEvents => Ok(ResponsePayload::Subscribed {
            client_id: client_id.clone(),
        }),

        Command::UnsubscribeEvents => Ok(ResponsePayload::Unsubscribed),

        Command::GetHealth => Ok(ResponsePayload::Health(HealthStatus {
            live: true,
            store_ok: ctx.store.is_healthy(),
        })),

        Command::Ping => Ok(ResponsePayload::Pong),
    };

    match result {
        Ok(payload) => Response::success(request_id, payload),
        Err(e) => {
            debug!(request_id, error = %e, "Command failed");
            Response::error(request_id, ErrorInfo::new(e.code(), e.to_string()))
        }
    }
}

/// Client-facing form of a core event
fn event_payload(event: CoreEvent) -> EventPayload {
    match event {
        CoreEvent::LeaseStarted {
            account_id,
            inventory_name,
            owner,
            expires_at,
        } => EventPayload::LeaseStarted {
            account_id,
            inventory_name,
            owner,
            expires_at,
        },
        CoreEvent::LeaseExtended {
            account_id,
            owner,
            duration_hours,
            expires_at,
        } => EventPayload::LeaseExtended {
            account_id,
            owner,
            duration_hours,
            expires_at,
        },
        CoreEvent::LeaseReleased { account_id, owner } => {
            EventPayload::LeaseReleased { account_id, owner }
        }
        CoreEvent::ExpiryWarning {
            account_id,
            owner,
            remaining,
        } => EventPayload::ExpiryWarning {
            account_id,
            owner,
            remaining_minutes: remaining.num_minutes(),
        },
        CoreEvent::AccountRotated { account_id, login } => {
            EventPayload::AccountRotated { account_id, login }
        }
        CoreEvent::RotationQuarantined { account_id, reason } => {
            EventPayload::RotationQuarantined { account_id, reason }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "lessord starting"
    );

    let service = Service::new(&args).await?;
    service.run().await?;

    Ok(())
}
