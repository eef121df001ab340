//! rsvp admission service
//!
//! Serves the admission API: members RSVP to capacity-limited events,
//! overflow goes to a FIFO waitlist, and freed seats are handed to the
//! waitlist under a per-event lock.

use std::sync::Arc;

use anyhow::Result;
use rsvp_admission::{
    admission::{AdmissionOptions, AdmissionService},
    api,
    config::{self, StorageBackend},
    db::Database,
    notify::NotificationTemplates,
    state::AppState,
    store::{LedgerStore, MemoryStore},
};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to RSVP_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting rsvp admission service");
    info!(
        listen_addr = %config.listen_addr,
        storage = ?config.storage,
        lock_timeout_ms = config.lock_timeout.as_millis() as u64,
        admin_capacity_policy = config.admin_capacity_policy.as_str(),
        "Configuration loaded"
    );

    let store: Arc<dyn LedgerStore> = match config.storage {
        StorageBackend::Memory => {
            warn!("Using in-memory ledger; state is lost on restart");
            Arc::new(MemoryStore::new(config.lock_timeout))
        }
        StorageBackend::Postgres => {
            let db = match Database::connect(&config.database).await {
                Ok(db) => {
                    info!("Database connection established");
                    db
                }
                Err(e) => {
                    error!(error = %e, "Failed to connect to database");
                    return Err(e.into());
                }
            };

            // Run migrations in dev mode
            if config.dev_mode {
                info!("Running database migrations (dev mode)");
                if let Err(e) = db.run_migrations().await {
                    error!(error = %e, "Failed to run migrations");
                    return Err(e.into());
                }
            }

            Arc::new(db.ledger_store(config.lock_timeout))
        }
    };

    let admission = AdmissionService::new(store)
        .with_templates(NotificationTemplates::new(config.public_base_url.clone()))
        .with_options(AdmissionOptions {
            admin_capacity_policy: config.admin_capacity_policy,
        });

    let app = api::create_router(AppState::new(admission));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(true);
            let shutdown_timeout = std::time::Duration::from_secs(10);
            if tokio::time::timeout(shutdown_timeout, &mut server_handle).await.is_err() {
                warn!("HTTP server did not shut down in time");
            }
        }
        result = &mut server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    info!("Admission service shutdown complete");
    Ok(())
}
