//! Donation logger — entry point.
//!
//! Opens the local donation queue, starts the connectivity trigger that
//! syncs on reconnect, and serves the REST API the browser form talks to.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use donation_logger::api::{self, ApiState};
use donation_logger::config::Config;
use donation_logger::connectivity::{self, Connectivity};
use donation_logger::ledger::HttpLedger;
use donation_logger::store;
use donation_logger::submission::Submitter;
use donation_logger::sync::SyncEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    info!(
        "UDI policy: {}, starting {}",
        config.udi_policy.name(),
        if config.start_online { "online" } else { "offline" }
    );

    // Open the queue; anything still in it was never confirmed by the ledger.
    let pool = store::init_pool(&config.database_url).await?;
    let backlog = store::count(&pool).await?;
    info!("{backlog} donation(s) pending from earlier sessions");

    let ledger = Arc::new(HttpLedger::new(
        config.ledger_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
    )?);
    let engine = Arc::new(SyncEngine::new(
        pool,
        ledger,
        Connectivity::new(config.start_online),
    ));

    // ─── Connectivity trigger ─────────────────────────────
    let shutdown = CancellationToken::new();
    let trigger = tokio::spawn(connectivity::run(engine.clone(), shutdown.clone()));

    if backlog > 0 {
        let engine = engine.clone();
        tokio::spawn(async move {
            engine.sync_pass().await;
        });
    }

    // ─── REST API ─────────────────────────────────────────
    let submitter = Arc::new(Submitter::new(engine, config.udi_policy.clone()));
    let app = api::router(Arc::new(ApiState { submitter }));

    let addr = format!("{}:{}", config.bind_addr, config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    trigger.await?;
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
