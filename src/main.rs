// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! `gignova-devnet`: storage nodes, aggregator and key servers in one
//! process, observing the configured marketplace ledger.

use std::sync::Arc;

use gignova::api::router;
use gignova::config::DevnetConfig;
use gignova::expiry::ExpirySweeper;
use gignova::ledger::{EvmLedger, Ledger};
use gignova::logging::init_logging;
use gignova::state::{key_servers_from_seed, DevnetState};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() {
    let config = DevnetConfig::from_env().expect("Invalid devnet configuration");
    init_logging(config.json_logs);

    let ledger: Arc<dyn Ledger> = Arc::new(
        EvmLedger::connect(config.ledger.clone())
            .await
            .expect("Failed to connect to the ledger"),
    );

    let key_servers = key_servers_from_seed(
        config.key_seed.as_bytes(),
        config.key_servers,
        &config.public_url,
        Arc::clone(&ledger),
    )
    .expect("Failed to derive key server secrets");
    let state = DevnetState::new(ledger, config.storage_nodes, key_servers);

    let shutdown = CancellationToken::new();
    let sweeper = ExpirySweeper::new(state.clone()).with_interval(config.sweep_interval);
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .expect("Failed to bind listen address");

    tracing::info!(
        address = %config.bind_address(),
        public_url = %config.public_url,
        storage_nodes = config.storage_nodes,
        key_servers = config.key_servers,
        "GigNova devnet listening (docs at /docs)"
    );

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await
        .expect("Devnet server failed");

    shutdown.cancel();
    let _ = sweeper_handle.await;
    tracing::info!("GigNova devnet stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
