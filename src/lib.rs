//! trigger-history -- durable execution history for job scheduler triggers.
//!
//! A [`listener::GlobalTriggerListener`] observes a scheduler's trigger
//! lifecycle and records one [`history::TriggerHistory`] row per fire
//! instance in SQLite. The HTTP API serves the history to dashboards and
//! accepts lifecycle events from remote scheduler nodes.

pub mod api;
pub mod config;
pub mod history;
pub mod listener;
pub mod scheduler;
pub mod storage;
pub mod store;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::listener::GlobalTriggerListener;
use crate::scheduler::Dispatcher;
use crate::store::{SqliteTriggerHistoryStore, TriggerHistoryStore};

/// Start the service: open storage, register the history listener, and serve
/// the API until the process is stopped.
pub async fn serve(config: &Config) -> Result<()> {
    // 1. Initialize Storage
    tracing::info!(db_path = %config.storage.path.display(), "Initializing database");
    let pool = storage::open_pool(&config.storage)?;
    let store: Arc<dyn TriggerHistoryStore> = Arc::new(SqliteTriggerHistoryStore::new());

    // 2. Register the history listener
    let listener = GlobalTriggerListener::builder()
        .pool(pool.clone())
        .store(Arc::clone(&store))
        .build()?;
    let dispatcher = Dispatcher::new().with_listener(Arc::new(listener));
    tracing::info!(
        listeners = dispatcher.listener_count(),
        "Trigger listeners registered"
    );

    // 3. Start API Server
    let addr: std::net::SocketAddr = config
        .api
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.api.bind))?;
    let app = api::router(api::state::AppState {
        pool,
        store,
        dispatcher: Arc::new(dispatcher),
    });

    tracing::info!(%addr, "trigger-history listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
