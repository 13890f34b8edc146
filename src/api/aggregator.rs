// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Aggregator: rebuilds whole blobs from the storage nodes.

use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};

use super::nodes::parse_blob_id;
use crate::{
    error::ApiError,
    models::BlobId,
    state::DevnetState,
    storage::{encoding::decode, BlobMetadata},
};

async fn find_metadata(state: &DevnetState, blob_id: &BlobId) -> Option<BlobMetadata> {
    for node in state.nodes.iter() {
        if let Some(metadata) = node.read().await.metadata(blob_id) {
            if metadata.verify().is_ok() {
                return Some(metadata.clone());
            }
        }
    }
    None
}

#[utoipa::path(
    get,
    path = "/aggregator/v1/blobs/{blob_id}",
    params(("blob_id" = String, Path, description = "Blob id")),
    tag = "Aggregator",
    responses(
        (status = 200, content_type = "application/octet-stream", body = Vec<u8>),
        (status = 404, description = "Blob not stored", body = crate::error::ErrorBody),
        (status = 503, description = "Too few slivers available", body = crate::error::ErrorBody)
    )
)]
pub async fn get_blob(
    Path(blob_id): Path<String>,
    State(state): State<DevnetState>,
) -> Result<impl IntoResponse, ApiError> {
    let blob_id = parse_blob_id(&blob_id)?;
    let metadata = find_metadata(&state, &blob_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Blob {blob_id} not stored")))?;

    let node_count = state.nodes.len();
    let mut slivers = Vec::with_capacity(metadata.sliver_count());
    for j in 0..metadata.sliver_count() {
        let sliver = state.nodes[j % node_count]
            .read()
            .await
            .sliver(&blob_id, j)
            .map(<[u8]>::to_vec);
        slivers.push(sliver);
    }

    let data = decode(&metadata, slivers).map_err(|e| ApiError::unavailable(e.to_string()))?;
    tracing::debug!(blob_id = %blob_id, size = data.len(), "Blob aggregated");
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}
