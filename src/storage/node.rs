// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Storage node HTTP client and wire types.

use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::encoding::BlobMetadata;
use crate::models::{BlobId, ObjectId, TxDigest};

/// Error code a node returns when it cannot see the registration.
pub const NOT_REGISTERED: &str = "not_registered";

/// Errors returned by storage node requests.
#[derive(Debug, thiserror::Error)]
pub enum StorageNodeError {
    /// The node cannot see the registration transaction yet.
    #[error("Node {node} has not observed the registration of blob {blob_id}")]
    NotRegistered { node: String, blob_id: BlobId },

    #[error("Not found on node {node}: {what}")]
    NotFound { node: String, what: String },

    #[error("Node {node} rejected the request ({status}): {message}")]
    Rejected {
        node: String,
        status: u16,
        message: String,
    },

    #[error("Node {node} unreachable: {message}")]
    Transport { node: String, message: String },
}

/// Proof that a blob was registered on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RegistrationProof {
    #[schema(value_type = String)]
    pub digest: TxDigest,
    #[schema(value_type = String)]
    pub object_id: ObjectId,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PutMetadataRequest {
    pub registration: RegistrationProof,
    pub metadata: BlobMetadata,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct RegistrationStatus {
    pub registered: bool,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

/// Client for one storage node.
#[derive(Clone, Debug)]
pub struct StorageNodeClient {
    base_url: String,
    client: reqwest::Client,
}

impl StorageNodeClient {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn blob_url(&self, blob_id: &BlobId, suffix: &str) -> String {
        format!("{}/v1/blobs/{}/{}", self.base_url, blob_id, suffix)
    }

    fn transport(&self, e: reqwest::Error) -> StorageNodeError {
        StorageNodeError::Transport {
            node: self.base_url.clone(),
            message: e.to_string(),
        }
    }

    async fn check(
        &self,
        response: reqwest::Response,
        blob_id: &BlobId,
        what: &str,
    ) -> Result<reqwest::Response, StorageNodeError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.json::<ErrorBody>().await.ok();
        let (code, message) = body.map(|b| (b.error_code, b.message)).unwrap_or_default();

        Err(match status {
            StatusCode::CONFLICT if code == NOT_REGISTERED => StorageNodeError::NotRegistered {
                node: self.base_url.clone(),
                blob_id: *blob_id,
            },
            StatusCode::NOT_FOUND => StorageNodeError::NotFound {
                node: self.base_url.clone(),
                what: what.to_string(),
            },
            _ => StorageNodeError::Rejected {
                node: self.base_url.clone(),
                status: status.as_u16(),
                message,
            },
        })
    }

    /// Store blob metadata. The node verifies the registration first.
    pub async fn put_metadata(
        &self,
        metadata: &BlobMetadata,
        registration: &RegistrationProof,
    ) -> Result<(), StorageNodeError> {
        let body = PutMetadataRequest {
            registration: registration.clone(),
            metadata: metadata.clone(),
        };
        let response = self
            .client
            .put(self.blob_url(&metadata.blob_id, "metadata"))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.check(response, &metadata.blob_id, "metadata").await?;
        Ok(())
    }

    pub async fn put_sliver(
        &self,
        blob_id: &BlobId,
        index: usize,
        sliver: &[u8],
    ) -> Result<(), StorageNodeError> {
        let response = self
            .client
            .put(self.blob_url(blob_id, &format!("slivers/{index}")))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(sliver.to_vec())
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.check(response, blob_id, "sliver").await?;
        Ok(())
    }

    pub async fn get_metadata(&self, blob_id: &BlobId) -> Result<BlobMetadata, StorageNodeError> {
        let response = self
            .client
            .get(self.blob_url(blob_id, "metadata"))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.check(response, blob_id, "metadata")
            .await?
            .json()
            .await
            .map_err(|e| self.transport(e))
    }

    pub async fn get_sliver(
        &self,
        blob_id: &BlobId,
        index: usize,
    ) -> Result<Vec<u8>, StorageNodeError> {
        let response = self
            .client
            .get(self.blob_url(blob_id, &format!("slivers/{index}")))
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let bytes = self
            .check(response, blob_id, "sliver")
            .await?
            .bytes()
            .await
            .map_err(|e| self.transport(e))?;
        Ok(bytes.to_vec())
    }

    /// Whether the node can see registration transaction `digest` for
    /// `blob_id`.
    pub async fn registration_visible(
        &self,
        blob_id: &BlobId,
        digest: &TxDigest,
    ) -> Result<bool, StorageNodeError> {
        let response = self
            .client
            .get(self.blob_url(blob_id, "registration"))
            .query(&[("digest", digest.to_string())])
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        let status: RegistrationStatus = self
            .check(response, blob_id, "registration")
            .await?
            .json()
            .await
            .map_err(|e| self.transport(e))?;
        Ok(status.registered)
    }
}

/// Client set for the configured storage nodes, sharing one HTTP client.
pub fn node_clients(
    urls: &[String],
    timeout: Duration,
) -> Result<Vec<StorageNodeClient>, StorageNodeError> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| StorageNodeError::Transport {
            node: "client".to_string(),
            message: e.to_string(),
        })?;
    Ok(urls
        .iter()
        .map(|url| StorageNodeClient::new(url.clone(), client.clone()))
        .collect())
}
