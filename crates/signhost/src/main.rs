//! signhost daemon
//!
//! Keeps the signage fleet roster, probes hosts, discovers peers and
//! gossips the roster with them over an axum HTTP API fronting a kameo actor.

use std::sync::Arc;

use color_eyre::Result;
use eyre::WrapErr;
use kameo::actor::Spawn;
use signhost_core::{FleetActor, FleetActorArgs};
use signhost_store::Store;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod factory;
mod router;
mod state;

use crate::config::{Config, DaemonConfig};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let (config, source) = Config::load_default()?;
    init_tracing(&config.daemon);
    match &source {
        Some(path) => info!(path = %path.display(), "loaded configuration"),
        None => warn!("no config file found, using defaults"),
    }

    let store = Arc::new(
        Store::open(&config.store.path)
            .wrap_err_with(|| format!("failed to open {}", config.store.path.display()))?,
    );
    info!(path = %store.path().display(), hosts = store.len(), "roster loaded");

    let sync = factory::build_fleet(&config, store.clone())?;
    sync.register_self()?;

    let fleet = FleetActor::spawn(FleetActorArgs { sync });

    let bind = config.daemon.bind.clone();
    let state = Arc::new(AppState::new(fleet.clone(), store, config));
    let app = router::create_router(state);

    let listener = TcpListener::bind(&bind)
        .await
        .wrap_err_with(|| format!("failed to bind {bind}"))?;
    info!(addr = %bind, "signhost daemon listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down");
    if let Err(e) = fleet.stop_gracefully().await {
        warn!(error = %e, "fleet actor did not stop cleanly");
    }
    Ok(())
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(daemon: &DaemonConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(daemon.log_level.as_str()));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if daemon.log_format.eq_ignore_ascii_case("json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
