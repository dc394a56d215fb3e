// SPDX-FileCopyrightText: 2026 Pendo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `pendo serve` command implementation.
//!
//! Wires the storage, bus, router, inactivity sweeper, and gateway
//! together and serves until SIGINT/SIGTERM. Initialization order
//! matters: storage first (it is the source of truth), metrics before
//! anything records, gateway last.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use pendo_bus::RoomBus;
use pendo_config::PendoConfig;
use pendo_core::PendoError;
use pendo_gateway::{AuthConfig, GatewayState, HealthState, ServerConfig};
use pendo_router::{InactivitySweeper, SessionRouter};
use pendo_storage::SqliteStore;

use crate::shutdown;

/// Initialize the tracing subscriber from the configured log level.
fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Install the Prometheus recorder and return the render closure for the
/// gateway `/metrics` endpoint.
fn init_metrics() -> Option<Arc<dyn Fn() -> String + Send + Sync>> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            pendo_router::metrics::register_metrics();
            info!("prometheus metrics recorder installed");
            Some(Arc::new(move || handle.render()) as Arc<dyn Fn() -> String + Send + Sync>)
        }
        Err(e) => {
            warn!(error = %e, "prometheus initialization failed, continuing without metrics");
            None
        }
    }
}

/// Runs the `pendo serve` command.
pub async fn run_serve(config: PendoConfig) -> Result<(), PendoError> {
    init_tracing(&config.service.log_level);

    info!(service = %config.service.name, "starting pendo serve");

    if config.server.bearer_token.is_none() {
        warn!("server.bearer_token is not set -- every /v1 request will be rejected");
    }

    // Prometheus recorder (if enabled).
    let prometheus_render = if config.metrics.enabled {
        init_metrics()
    } else {
        debug!("prometheus metrics disabled by configuration");
        None
    };

    // Storage: open, migrate, and hold as the single writer.
    let store = SqliteStore::new(config.storage.clone());
    store.initialize().await?;
    let store = Arc::new(store);

    // Realtime bus and the router on top of both.
    let bus = Arc::new(RoomBus::new(config.chat.room_buffer));
    let router = Arc::new(SessionRouter::new(
        Arc::clone(&store) as Arc<dyn pendo_core::ConversationStore>,
        Arc::clone(&bus),
    ));

    // Shutdown token shared by the sweeper and the gateway.
    let token = shutdown::install_signal_handler();

    // Inactivity sweeper (disabled unless configured).
    if let Some(sweeper) = InactivitySweeper::from_config(Arc::clone(&router), &config.chat) {
        tokio::spawn(sweeper.run(token.clone()));
    } else {
        debug!("inactivity sweeper disabled (chat.stale_session_minutes = 0)");
    }

    // Gateway serves until the token fires.
    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    let state = GatewayState {
        router,
        auth: AuthConfig {
            bearer_token: config.server.bearer_token.clone(),
        },
        health: HealthState {
            start_time: std::time::Instant::now(),
            prometheus_render,
        },
    };
    pendo_gateway::start_server(&server_config, state, token).await?;

    // Checkpoint and close storage on the way out.
    store.close().await?;
    info!("pendo serve stopped");
    Ok(())
}
