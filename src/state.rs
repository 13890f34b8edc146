// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Shared state of the development network.

use std::sync::Arc;

use alloy::primitives::B256;
use k256::SecretKey;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::crypto::key_server::KeyServerInfo;
use crate::crypto::keys::{encode_public_key, KeyError};
use crate::crypto::LocalKeyServer;
use crate::error::ApiError;
use crate::ledger::Ledger;
use crate::store::NodeStore;

const KEY_SERVER_SECRET_DOMAIN: &[u8] = b"gignova/devnet/key-server-secret/v1";
const KEY_SERVER_ID_DOMAIN: &[u8] = b"gignova/devnet/key-server-id/v1";

#[derive(Clone)]
pub struct DevnetState {
    /// Read view storage nodes and key servers consult.
    pub ledger: Arc<dyn Ledger>,
    pub nodes: Arc<Vec<RwLock<NodeStore>>>,
    pub key_servers: Arc<Vec<LocalKeyServer>>,
}

impl DevnetState {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        node_count: usize,
        key_servers: Vec<LocalKeyServer>,
    ) -> Self {
        Self {
            ledger,
            nodes: Arc::new((0..node_count).map(|_| RwLock::new(NodeStore::new())).collect()),
            key_servers: Arc::new(key_servers),
        }
    }

    pub fn node(&self, index: usize) -> Result<&RwLock<NodeStore>, ApiError> {
        self.nodes
            .get(index)
            .ok_or_else(|| ApiError::not_found(format!("No storage node {index}")))
    }

    pub fn key_server(&self, index: usize) -> Result<&LocalKeyServer, ApiError> {
        self.key_servers
            .get(index)
            .ok_or_else(|| ApiError::not_found(format!("No key server {index}")))
    }

    pub fn key_server_infos(&self) -> Vec<KeyServerInfo> {
        self.key_servers.iter().map(LocalKeyServer::info).collect()
    }
}

/// `count` key servers whose secrets are derived from `seed`, reachable
/// under `{public_url}/key-servers/{index}`.
///
/// The same seed always yields the same keys, so containers sealed against
/// one devnet run stay readable after a restart.
pub fn key_servers_from_seed(
    seed: &[u8],
    count: usize,
    public_url: &str,
    ledger: Arc<dyn Ledger>,
) -> Result<Vec<LocalKeyServer>, KeyError> {
    let public_url = public_url.trim_end_matches('/');
    (0..count)
        .map(|index| {
            let mut hasher = Sha256::new();
            hasher.update(KEY_SERVER_SECRET_DOMAIN);
            hasher.update(seed);
            hasher.update((index as u32).to_be_bytes());
            let secret = SecretKey::from_slice(&hasher.finalize())
                .map_err(|e| KeyError::Derivation(e.to_string()))?;

            let mut hasher = Sha256::new();
            hasher.update(KEY_SERVER_ID_DOMAIN);
            hasher.update(encode_public_key(&secret.public_key()));
            let object_id = B256::from_slice(&hasher.finalize());

            Ok(LocalKeyServer::new(
                object_id,
                format!("{public_url}/key-servers/{index}"),
                secret,
                Arc::clone(&ledger),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;

    #[test]
    fn seeded_key_servers_are_stable() {
        let ledger: Arc<dyn Ledger> = Arc::new(InMemoryLedger::new());
        let a = key_servers_from_seed(b"seed", 3, "http://127.0.0.1:9000/", Arc::clone(&ledger))
            .unwrap();
        let b = key_servers_from_seed(b"seed", 3, "http://127.0.0.1:9000", Arc::clone(&ledger))
            .unwrap();
        let other = key_servers_from_seed(b"other", 3, "http://127.0.0.1:9000", ledger).unwrap();

        let infos: Vec<_> = a.iter().map(LocalKeyServer::info).collect();
        assert_eq!(
            infos,
            b.iter().map(LocalKeyServer::info).collect::<Vec<_>>()
        );
        assert_ne!(infos[0], other[0].info());
        assert_ne!(infos[0].object_id, infos[1].object_id);
        assert_eq!(infos[2].url, "http://127.0.0.1:9000/key-servers/2");
    }

    #[test]
    fn unknown_indices_are_not_found() {
        let state = DevnetState::new(Arc::new(InMemoryLedger::new()), 2, Vec::new());
        assert!(state.node(1).is_ok());
        assert!(state.node(2).is_err());
        assert!(state.key_server(0).is_err());
    }
}
