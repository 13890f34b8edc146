// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! In-memory sliver store of one development storage node.

use std::collections::HashMap;

use crate::error::ApiError;
use crate::models::{BlobId, ObjectId};
use crate::storage::BlobMetadata;

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub metadata: BlobMetadata,
    pub object_id: ObjectId,
    slivers: HashMap<usize, Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct NodeStore {
    blobs: HashMap<BlobId, StoredBlob>,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record metadata for a registered blob. Slivers already stored under
    /// identical metadata are kept.
    pub fn put_metadata(&mut self, metadata: BlobMetadata, object_id: ObjectId) {
        match self.blobs.get_mut(&metadata.blob_id) {
            Some(existing) if existing.metadata == metadata => existing.object_id = object_id,
            _ => {
                self.blobs.insert(
                    metadata.blob_id,
                    StoredBlob {
                        metadata,
                        object_id,
                        slivers: HashMap::new(),
                    },
                );
            }
        }
    }

    pub fn put_sliver(
        &mut self,
        blob_id: &BlobId,
        index: usize,
        sliver: Vec<u8>,
    ) -> Result<(), ApiError> {
        let blob = self
            .blobs
            .get_mut(blob_id)
            .ok_or_else(|| ApiError::not_found(format!("No metadata for blob {blob_id}")))?;

        if index >= blob.metadata.sliver_count() {
            return Err(ApiError::unprocessable(format!("Blob {blob_id} has no sliver {index}")));
        }
        if !blob.metadata.sliver_matches(index, &sliver) {
            return Err(ApiError::unprocessable(format!(
                "Sliver {index} does not match its digest"
            )));
        }
        blob.slivers.insert(index, sliver);
        Ok(())
    }

    pub fn metadata(&self, blob_id: &BlobId) -> Option<&BlobMetadata> {
        self.blobs.get(blob_id).map(|b| &b.metadata)
    }

    pub fn sliver(&self, blob_id: &BlobId, index: usize) -> Option<&[u8]> {
        self.blobs
            .get(blob_id)
            .and_then(|b| b.slivers.get(&index))
            .map(Vec::as_slice)
    }

    /// `(blob_id, object_id)` of every stored blob.
    pub fn registrations(&self) -> Vec<(BlobId, ObjectId)> {
        self.blobs
            .values()
            .map(|b| (b.metadata.blob_id, b.object_id))
            .collect()
    }

    pub fn remove(&mut self, blob_id: &BlobId) -> bool {
        self.blobs.remove(blob_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}
