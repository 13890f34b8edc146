// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Blob retrieval.
//!
//! The aggregator is tried first. On any failure the reader falls back once
//! to resolving the blob object through the ledger and rebuilding the blob
//! from storage node slivers. There are no further retries.

use std::sync::Arc;
use std::time::Duration;

use super::encoding::{data_sliver_count, decode, encode_slivers, sliver_digest, BlobMetadata};
use super::node::StorageNodeClient;
use crate::ledger::{Ledger, LedgerObject, ObjectRef};
use crate::models::{BlobId, ObjectId};

/// Default aggregator request timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
#[error("Blob {blob_id} unavailable (aggregator: {aggregator}; storage nodes: {fallback})")]
pub struct FetchError {
    pub blob_id: BlobId,
    pub aggregator: String,
    pub fallback: String,
}

/// Reads blobs from the aggregator with a storage node fallback.
#[derive(Clone)]
pub struct BlobReader {
    aggregator_url: String,
    client: reqwest::Client,
    ledger: Arc<dyn Ledger>,
    nodes: Vec<StorageNodeClient>,
}

impl BlobReader {
    pub fn new(
        aggregator_url: impl Into<String>,
        timeout: Duration,
        ledger: Arc<dyn Ledger>,
        nodes: Vec<StorageNodeClient>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            aggregator_url: aggregator_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
            ledger,
            nodes,
        })
    }

    /// Fetch the blob bytes, verified against `blob_id`.
    pub async fn fetch(
        &self,
        blob_id: &BlobId,
        object_id: &ObjectId,
    ) -> Result<Vec<u8>, FetchError> {
        let aggregator = match self.fetch_from_aggregator(blob_id).await {
            Ok(bytes) => return Ok(bytes),
            Err(reason) => reason,
        };

        tracing::warn!(
            blob_id = %blob_id,
            reason = %aggregator,
            "Aggregator fetch failed, falling back to storage nodes"
        );

        match self.fetch_from_nodes(blob_id, object_id).await {
            Ok(bytes) => {
                tracing::info!(blob_id = %blob_id, "Blob rebuilt from storage nodes");
                Ok(bytes)
            }
            Err(fallback) => Err(FetchError {
                blob_id: *blob_id,
                aggregator,
                fallback,
            }),
        }
    }

    async fn fetch_from_aggregator(&self, blob_id: &BlobId) -> Result<Vec<u8>, String> {
        let url = format!("{}/v1/blobs/{}", self.aggregator_url, blob_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("HTTP {}", response.status()));
        }
        let bytes = response.bytes().await.map_err(|e| e.to_string())?.to_vec();

        if !self.nodes.is_empty() {
            self.verify_content(blob_id, &bytes).await?;
        }
        Ok(bytes)
    }

    /// Re-encoding must reproduce the content id. The sliver count comes
    /// from the current node set, or from stored metadata when the blob was
    /// published to a different one.
    async fn verify_content(&self, blob_id: &BlobId, bytes: &[u8]) -> Result<(), String> {
        let k = data_sliver_count(self.nodes.len());
        if encode_slivers(bytes, k).blob_id() == *blob_id {
            return Ok(());
        }
        let metadata = self.fetch_metadata(blob_id).await?;
        if metadata.data_slivers != k
            && encode_slivers(bytes, metadata.data_slivers).blob_id() == *blob_id
        {
            return Ok(());
        }
        Err("content does not match blob id".to_string())
    }

    async fn fetch_from_nodes(
        &self,
        blob_id: &BlobId,
        object_id: &ObjectId,
    ) -> Result<Vec<u8>, String> {
        if self.nodes.is_empty() {
            return Err("no storage nodes configured".to_string());
        }

        let blob = match self.ledger.read_object(ObjectRef::Blob(*object_id)).await {
            Ok(Some(LedgerObject::Blob(blob))) => blob,
            Ok(_) => return Err(format!("blob object {object_id} not found")),
            Err(e) => return Err(e.to_string()),
        };
        if blob.blob_id != *blob_id {
            return Err(format!("blob object {object_id} records blob {}", blob.blob_id));
        }
        if let Ok(epoch) = self.ledger.current_epoch().await {
            if epoch >= blob.end_epoch {
                return Err(format!("blob expired at epoch {}", blob.end_epoch));
            }
        }
        if !blob.certified {
            tracing::warn!(blob_id = %blob_id, "Reading uncertified blob");
        }

        let metadata = self.fetch_metadata(blob_id).await?;
        let mut slivers = Vec::with_capacity(metadata.sliver_count());
        for j in 0..metadata.sliver_count() {
            slivers.push(self.fetch_sliver(blob_id, &metadata, j).await);
        }

        decode(&metadata, slivers).map_err(|e| e.to_string())
    }

    /// Sliver `j` from its usual node `j % n`, then from any other node.
    async fn fetch_sliver(
        &self,
        blob_id: &BlobId,
        metadata: &BlobMetadata,
        j: usize,
    ) -> Option<Vec<u8>> {
        let node_count = self.nodes.len();
        for offset in 0..node_count {
            let node = &self.nodes[(j + offset) % node_count];
            match node.get_sliver(blob_id, j).await {
                Ok(sliver) if sliver_digest(&sliver) == metadata.sliver_digests[j] => {
                    return Some(sliver);
                }
                Ok(_) => {
                    tracing::debug!(sliver = j, node = node.base_url(), "Sliver digest mismatch");
                }
                Err(e) => {
                    tracing::debug!(
                        sliver = j,
                        node = node.base_url(),
                        error = %e,
                        "Sliver unavailable"
                    );
                }
            }
        }
        None
    }

    /// First metadata record that verifies against `blob_id`.
    async fn fetch_metadata(&self, blob_id: &BlobId) -> Result<BlobMetadata, String> {
        let mut last_error = String::from("no node returned metadata");
        for node in &self.nodes {
            match node.get_metadata(blob_id).await {
                Ok(metadata) if metadata.blob_id == *blob_id && metadata.verify().is_ok() => {
                    return Ok(metadata);
                }
                Ok(_) => {
                    last_error = format!("{} returned inconsistent metadata", node.base_url());
                }
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(last_error)
    }
}
