// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Decryptor construction and caching.
//!
//! A [`Decryptor`] is bound to the key-server set recorded in a container.
//! Building one means connecting to every server in the set, so decryptors
//! are cached by the sorted service set in an LRU.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use alloy::primitives::B256;
use lru::LruCache;

use super::envelope::{Envelope, ServiceEntry};
use super::key_server::{FetchKeyRequest, HttpKeyServer, KeyServer, KeyServerError, KeyServerInfo};
use super::keys::{data_key, xor32};
use super::shamir::{self, Share};
use super::{open_body, DecryptError};
use crate::session::SessionCapability;

/// Default number of cached decryptors.
pub const DEFAULT_CACHE_CAPACITY: usize = 16;

/// Creates key server clients from container service entries.
pub trait KeyServerConnector: Send + Sync {
    fn connect(&self, service: &ServiceEntry) -> Result<Arc<dyn KeyServer>, KeyServerError>;
}

/// Connects over HTTP to servers from the configured directory.
///
/// Containers are untrusted input. A service entry is only connected when its
/// object id is in the directory and its URL is the one the directory lists.
#[derive(Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    directory: HashMap<B256, String>,
}

impl HttpConnector {
    pub fn new(client: reqwest::Client, directory: &[KeyServerInfo]) -> Self {
        let directory = directory
            .iter()
            .map(|info| (info.object_id, info.url.trim_end_matches('/').to_string()))
            .collect();
        Self { client, directory }
    }
}

impl KeyServerConnector for HttpConnector {
    fn connect(&self, service: &ServiceEntry) -> Result<Arc<dyn KeyServer>, KeyServerError> {
        let Some(url) = self.directory.get(&service.object_id) else {
            return Err(KeyServerError::AccessDenied(format!(
                "key server {} is not in the directory",
                service.object_id
            )));
        };
        if service.url.trim_end_matches('/') != url {
            return Err(KeyServerError::AccessDenied(format!(
                "key server {} is listed at {url}, container names {}",
                service.object_id, service.url
            )));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(KeyServerError::BadRequest(format!("unsupported key server url {url}")));
        }
        Ok(Arc::new(HttpKeyServer::new(url.clone(), self.client.clone())))
    }
}

/// Resolves servers by id from a fixed table, ignoring URLs.
#[derive(Clone, Default)]
pub struct StaticConnector {
    servers: HashMap<B256, Arc<dyn KeyServer>>,
}

impl StaticConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, object_id: B256, server: Arc<dyn KeyServer>) -> Self {
        self.servers.insert(object_id, server);
        self
    }
}

impl KeyServerConnector for StaticConnector {
    fn connect(&self, service: &ServiceEntry) -> Result<Arc<dyn KeyServer>, KeyServerError> {
        self.servers
            .get(&service.object_id)
            .cloned()
            .ok_or_else(|| {
                KeyServerError::Unavailable(format!("unknown key server {}", service.object_id))
            })
    }
}

/// Decrypts containers for one key-server set.
pub struct Decryptor {
    servers: HashMap<B256, Arc<dyn KeyServer>>,
}

impl Decryptor {
    /// Collect `threshold` share masks, rebuild the data key and open the
    /// body.
    ///
    /// Denial or an expired capability from any server ends the attempt;
    /// transport failures move on to the next server.
    pub async fn decrypt(
        &self,
        envelope: &Envelope,
        capability: &SessionCapability,
    ) -> Result<Vec<u8>, DecryptError> {
        let header = &envelope.header;
        let threshold = header.threshold as usize;
        let mut shares = Vec::with_capacity(threshold);
        let mut failures = Vec::new();

        for service in &header.services {
            if shares.len() >= threshold {
                break;
            }
            let Some(server) = self.servers.get(&service.object_id) else {
                failures.push(format!("{}: not connected", service.object_id));
                continue;
            };

            let request = FetchKeyRequest {
                id: header.id.clone(),
                ephemeral_key: service.ephemeral_key.clone(),
                share_index: service.index,
                capability: capability.clone(),
            };
            match server.fetch_key(&request).await {
                Ok(response) => shares.push(unseal_share(service, response.mask.as_ref())?),
                Err(KeyServerError::SessionExpired) => return Err(DecryptError::SessionExpired),
                Err(KeyServerError::AccessDenied(msg))
                | Err(KeyServerError::InvalidCapability(msg)) => {
                    return Err(DecryptError::AccessDenied(msg))
                }
                Err(KeyServerError::BadRequest(msg)) => return Err(DecryptError::Corrupted(msg)),
                Err(e @ KeyServerError::Unavailable(_)) => {
                    tracing::warn!(
                        key_server = %service.object_id,
                        url = %service.url,
                        error = %e,
                        "Key server request failed, trying next"
                    );
                    failures.push(format!("{}: {e}", service.object_id));
                }
            }
        }

        if shares.len() < threshold {
            return Err(DecryptError::Unavailable(format!(
                "{} of {threshold} key shares obtained ({})",
                shares.len(),
                failures.join("; ")
            )));
        }

        let secret =
            shamir::combine(&shares).map_err(|e| DecryptError::Corrupted(e.to_string()))?;
        open_body(
            &data_key(&secret),
            header.body_nonce.as_ref(),
            header.id.as_ref(),
            &envelope.body,
        )
    }
}

fn unseal_share(service: &ServiceEntry, mask: &[u8]) -> Result<Share, DecryptError> {
    let mask: [u8; 32] = mask
        .try_into()
        .map_err(|_| DecryptError::Corrupted("key server returned a malformed mask".into()))?;
    let sealed: [u8; 32] = service
        .sealed_share
        .as_ref()
        .try_into()
        .map_err(|_| DecryptError::Corrupted("sealed share length".into()))?;
    Share::from_bytes(service.index, &xor32(&sealed, &mask))
        .map_err(|e| DecryptError::Corrupted(e.to_string()))
}

type ServiceSetKey = Vec<(B256, String)>;

/// LRU of decryptors keyed by key-server set.
pub struct DecryptorCache {
    connector: Arc<dyn KeyServerConnector>,
    cache: Mutex<LruCache<ServiceSetKey, Arc<Decryptor>>>,
}

impl DecryptorCache {
    pub fn new(connector: Arc<dyn KeyServerConnector>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            connector,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn key(services: &[ServiceEntry]) -> ServiceSetKey {
        let mut key: ServiceSetKey = services
            .iter()
            .map(|s| (s.object_id, s.url.clone()))
            .collect();
        key.sort();
        key.dedup();
        key
    }

    /// Cached decryptor for `services`, building one on a miss.
    pub fn decryptor_for(&self, services: &[ServiceEntry]) -> Result<Arc<Decryptor>, DecryptError> {
        let key = Self::key(services);
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return Ok(Arc::clone(hit));
            }
        }

        let mut servers = HashMap::with_capacity(services.len());
        for service in services {
            match self.connector.connect(service) {
                Ok(server) => {
                    servers.insert(service.object_id, server);
                }
                // Unreachable servers are tolerated while enough remain
                Err(e) => tracing::warn!(
                    key_server = %service.object_id,
                    error = %e,
                    "Could not connect to key server"
                ),
            }
        }
        let decryptor = Arc::new(Decryptor { servers });
        tracing::debug!(servers = key.len(), "Decryptor built");

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(key, Arc::clone(&decryptor));
        }
        Ok(decryptor)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
