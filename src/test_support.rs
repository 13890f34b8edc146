// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Devnet router on an ephemeral local port, backed by an in-memory ledger.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use tokio_util::sync::CancellationToken;

use crate::api::router;
use crate::client::GigNovaClient;
use crate::config::ClientConfig;
use crate::crypto::HttpConnector;
use crate::ledger::{EvmLedgerConfig, InMemoryLedger, Ledger};
use crate::pipeline::DEFAULT_MAX_FILE_SIZE;
use crate::state::{key_servers_from_seed, DevnetState};
use crate::storage::{PropagationPolicy, PublisherConfig, DEFAULT_EPOCHS};

pub struct TestDevnet {
    pub url: String,
    /// Canonical ledger; the devnet observes it through a lagging replica.
    pub ledger: InMemoryLedger,
    pub state: DevnetState,
    shutdown: CancellationToken,
}

impl TestDevnet {
    pub async fn start(storage_nodes: usize, key_servers: usize, lag: Duration) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        let ledger = InMemoryLedger::new();
        let view: Arc<dyn Ledger> = Arc::new(ledger.replica(lag));
        let servers =
            key_servers_from_seed(b"test-devnet", key_servers, &url, Arc::clone(&view)).unwrap();
        let state = DevnetState::new(view, storage_nodes, servers);

        let shutdown = CancellationToken::new();
        let app = router(state.clone());
        let stop = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
                .unwrap();
        });

        Self {
            url,
            ledger,
            state,
            shutdown,
        }
    }

    pub fn node_urls(&self) -> Vec<String> {
        (0..self.state.nodes.len())
            .map(|i| format!("{}/nodes/{i}", self.url))
            .collect()
    }

    /// Client configuration pointing at this devnet.
    pub fn client_config(&self, propagation: PropagationPolicy) -> ClientConfig {
        ClientConfig {
            ledger: EvmLedgerConfig::new("http://127.0.0.1:8545".parse().unwrap(), Address::ZERO),
            storage_nodes: self.node_urls(),
            aggregator_url: format!("{}/aggregator", self.url),
            key_server_directory: format!("{}/key-servers", self.url),
            key_server_threshold: 2,
            publisher: PublisherConfig {
                epochs: DEFAULT_EPOCHS,
                propagation,
            },
            fetch_timeout: Duration::from_secs(5),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Client over the canonical ledger, talking HTTP to this devnet.
    pub fn client(&self, config: &ClientConfig) -> GigNovaClient {
        let key_servers = self.state.key_server_infos();
        let connector = Arc::new(HttpConnector::new(reqwest::Client::new(), &key_servers));
        GigNovaClient::from_parts(Arc::new(self.ledger.clone()), config, key_servers, connector)
        .unwrap()
    }
}

impl Drop for TestDevnet {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Poll interval short enough for tests.
pub fn fast_poll() -> PropagationPolicy {
    PropagationPolicy::PollUntilVisible {
        interval: Duration::from_millis(20),
        timeout: Duration::from_secs(5),
    }
}
