// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Client wiring: ledger, key servers, storage, submission and retrieval.

use std::sync::Arc;

use crate::config::ClientConfig;
use crate::crypto::key_server::{default_http_client, fetch_directory, KeyServerInfo};
use crate::crypto::registry::DEFAULT_CACHE_CAPACITY;
use crate::crypto::{
    DecryptorCache, EncryptError, EncryptionClient, HttpConnector, KeyServerConnector,
    KeyServerError,
};
use crate::ledger::{EvmLedger, Ledger, LedgerError};
use crate::pipeline::{RetrievalService, SubmissionCoordinator};
use crate::storage::{node_clients, BlobPublisher, BlobReader, StorageNodeError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Ledger connection failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Key server directory unavailable: {0}")]
    KeyServers(#[from] KeyServerError),

    #[error("Storage client setup failed: {0}")]
    Storage(#[from] StorageNodeError),

    #[error("Encryption setup failed: {0}")]
    Encryption(#[from] EncryptError),

    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Everything a marketplace frontend needs to submit and retrieve
/// deliverables.
pub struct GigNovaClient {
    ledger: Arc<dyn Ledger>,
    submissions: SubmissionCoordinator,
    retrieval: RetrievalService,
}

impl GigNovaClient {
    /// Connect to the configured ledger and load the key server listing.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let ledger: Arc<dyn Ledger> = Arc::new(EvmLedger::connect(config.ledger.clone()).await?);
        let http = default_http_client()?;
        let key_servers = fetch_directory(&http, &config.key_server_directory).await?;
        tracing::info!(
            key_servers = key_servers.len(),
            threshold = config.key_server_threshold,
            storage_nodes = config.storage_nodes.len(),
            "Key server directory loaded"
        );
        let connector = Arc::new(HttpConnector::new(http, &key_servers));
        Self::from_parts(ledger, config, key_servers, connector)
    }

    /// Assemble a client over an existing ledger view and key server set.
    pub fn from_parts(
        ledger: Arc<dyn Ledger>,
        config: &ClientConfig,
        key_servers: Vec<KeyServerInfo>,
        connector: Arc<dyn KeyServerConnector>,
    ) -> Result<Self, ClientError> {
        let nodes = node_clients(&config.storage_nodes, config.fetch_timeout)?;
        let encryption = EncryptionClient::new(key_servers, config.key_server_threshold)?;
        let publisher = BlobPublisher::new(Arc::clone(&ledger), nodes.clone(), config.publisher);
        let submissions = SubmissionCoordinator::new(Arc::clone(&ledger), encryption, publisher)
            .with_max_file_size(config.max_file_size);

        let reader = BlobReader::new(
            config.aggregator_url.clone(),
            config.fetch_timeout,
            Arc::clone(&ledger),
            nodes,
        )?;
        let retrieval = RetrievalService::new(
            reader,
            DecryptorCache::new(connector, DEFAULT_CACHE_CAPACITY),
        );

        Ok(Self {
            ledger,
            submissions,
            retrieval,
        })
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn submissions(&self) -> &SubmissionCoordinator {
        &self.submissions
    }

    pub fn retrieval(&self) -> &RetrievalService {
        &self.retrieval
    }
}
