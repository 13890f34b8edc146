// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Storage node endpoints.
//!
//! A node accepts metadata only once the registration transaction named in
//! the request is visible through its ledger view; until then it answers
//! 409 `not_registered`.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::ApiError,
    ledger::{Ledger, LedgerError},
    models::{BlobId, ObjectId, TxDigest},
    state::DevnetState,
    storage::{
        node::{PutMetadataRequest, RegistrationStatus},
        BlobMetadata,
    },
};

#[derive(Deserialize, IntoParams)]
pub struct RegistrationQuery {
    /// Registration transaction digest.
    pub digest: String,
}

pub(crate) fn parse_blob_id(raw: &str) -> Result<BlobId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid blob id {raw}")))
}

/// Whether `digest` registered `blob_id` (as `object_id`, when given), as
/// seen by `ledger`.
async fn registration_visible(
    ledger: &dyn Ledger,
    digest: TxDigest,
    blob_id: &BlobId,
    object_id: Option<&ObjectId>,
) -> Result<bool, ApiError> {
    match ledger.effects(digest).await {
        Ok(Some(effects)) => Ok(effects
            .registered_blob(blob_id)
            .is_some_and(|(registered, _)| object_id.is_none_or(|id| *id == registered))),
        Ok(None) | Err(LedgerError::Reverted { .. }) => Ok(false),
        Err(e) => Err(ApiError::unavailable(e.to_string())),
    }
}

#[utoipa::path(
    put,
    path = "/nodes/{node}/v1/blobs/{blob_id}/metadata",
    params(
        ("node" = usize, Path, description = "Storage node index"),
        ("blob_id" = String, Path, description = "Blob id")
    ),
    request_body = PutMetadataRequest,
    tag = "Storage nodes",
    responses(
        (status = 204, description = "Metadata stored"),
        (status = 409, description = "Registration not visible yet", body = crate::error::ErrorBody),
        (status = 422, description = "Metadata inconsistent", body = crate::error::ErrorBody)
    )
)]
pub async fn put_metadata(
    Path((node, blob_id)): Path<(usize, String)>,
    State(state): State<DevnetState>,
    Json(request): Json<PutMetadataRequest>,
) -> Result<StatusCode, ApiError> {
    let blob_id = parse_blob_id(&blob_id)?;
    let store = state.node(node)?;

    if request.metadata.blob_id != blob_id {
        return Err(ApiError::bad_request("Metadata is for a different blob"));
    }
    request
        .metadata
        .verify()
        .map_err(|e| ApiError::unprocessable(e.to_string()))?;

    let proof = &request.registration;
    if !registration_visible(
        state.ledger.as_ref(),
        proof.digest,
        &blob_id,
        Some(&proof.object_id),
    )
    .await?
    {
        tracing::debug!(node, blob_id = %blob_id, digest = %proof.digest, "Registration not visible");
        return Err(ApiError::not_registered(format!(
            "Registration {} of blob {blob_id} is not visible",
            proof.digest
        )));
    }

    store
        .write()
        .await
        .put_metadata(request.metadata, proof.object_id);
    tracing::debug!(node, blob_id = %blob_id, "Metadata stored");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/nodes/{node}/v1/blobs/{blob_id}/slivers/{index}",
    params(
        ("node" = usize, Path, description = "Storage node index"),
        ("blob_id" = String, Path, description = "Blob id"),
        ("index" = usize, Path, description = "Sliver index")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    tag = "Storage nodes",
    responses(
        (status = 204, description = "Sliver stored"),
        (status = 404, description = "No metadata for the blob", body = crate::error::ErrorBody),
        (status = 422, description = "Sliver does not match its digest", body = crate::error::ErrorBody)
    )
)]
pub async fn put_sliver(
    Path((node, blob_id, index)): Path<(usize, String, usize)>,
    State(state): State<DevnetState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let blob_id = parse_blob_id(&blob_id)?;
    state
        .node(node)?
        .write()
        .await
        .put_sliver(&blob_id, index, body.to_vec())?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/nodes/{node}/v1/blobs/{blob_id}/metadata",
    params(
        ("node" = usize, Path, description = "Storage node index"),
        ("blob_id" = String, Path, description = "Blob id")
    ),
    tag = "Storage nodes",
    responses(
        (status = 200, body = BlobMetadata),
        (status = 404, body = crate::error::ErrorBody)
    )
)]
pub async fn get_metadata(
    Path((node, blob_id)): Path<(usize, String)>,
    State(state): State<DevnetState>,
) -> Result<Json<BlobMetadata>, ApiError> {
    let blob_id = parse_blob_id(&blob_id)?;
    state
        .node(node)?
        .read()
        .await
        .metadata(&blob_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Blob {blob_id} not stored")))
}

#[utoipa::path(
    get,
    path = "/nodes/{node}/v1/blobs/{blob_id}/slivers/{index}",
    params(
        ("node" = usize, Path, description = "Storage node index"),
        ("blob_id" = String, Path, description = "Blob id"),
        ("index" = usize, Path, description = "Sliver index")
    ),
    tag = "Storage nodes",
    responses(
        (status = 200, content_type = "application/octet-stream", body = Vec<u8>),
        (status = 404, body = crate::error::ErrorBody)
    )
)]
pub async fn get_sliver(
    Path((node, blob_id, index)): Path<(usize, String, usize)>,
    State(state): State<DevnetState>,
) -> Result<impl IntoResponse, ApiError> {
    let blob_id = parse_blob_id(&blob_id)?;
    let sliver = state
        .node(node)?
        .read()
        .await
        .sliver(&blob_id, index)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| ApiError::not_found(format!("Sliver {index} of {blob_id} not stored")))?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], sliver))
}

#[utoipa::path(
    get,
    path = "/nodes/{node}/v1/blobs/{blob_id}/registration",
    params(
        ("node" = usize, Path, description = "Storage node index"),
        ("blob_id" = String, Path, description = "Blob id"),
        RegistrationQuery
    ),
    tag = "Storage nodes",
    responses((status = 200, body = RegistrationStatus))
)]
pub async fn get_registration(
    Path((node, blob_id)): Path<(usize, String)>,
    Query(query): Query<RegistrationQuery>,
    State(state): State<DevnetState>,
) -> Result<Json<RegistrationStatus>, ApiError> {
    let blob_id = parse_blob_id(&blob_id)?;
    state.node(node)?;
    let digest: TxDigest = query
        .digest
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid digest {}", query.digest)))?;

    let registered = registration_visible(state.ledger.as_ref(), digest, &blob_id, None).await?;
    Ok(Json(RegistrationStatus { registered }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::ledger::{execute, InMemoryLedger, LedgerCall, Wallet};
    use crate::storage::{encode, RegistrationProof};

    async fn registered(
        ledger: &InMemoryLedger,
        data: &[u8],
    ) -> (crate::storage::EncodedBlob, RegistrationProof) {
        let encoded = encode(data, 3);
        let wallet = Wallet::random().unwrap();
        let effects = execute(
            ledger,
            &LedgerCall::RegisterBlob {
                blob_id: encoded.blob_id(),
                size: encoded.metadata.size,
                epochs: 2,
            },
            &wallet,
        )
        .await
        .unwrap();
        let (object_id, _) = effects.registered_blob(&encoded.blob_id()).unwrap();
        (
            encoded,
            RegistrationProof {
                digest: effects.digest,
                object_id,
            },
        )
    }

    #[tokio::test]
    async fn metadata_waits_for_registration() {
        let ledger = InMemoryLedger::new();
        let state = DevnetState::new(
            Arc::new(ledger.replica(Duration::from_millis(200))),
            3,
            Vec::new(),
        );
        let (encoded, proof) = registered(&ledger, b"lagging replica").await;
        let blob_id = encoded.blob_id().to_string();
        let request = PutMetadataRequest {
            registration: proof.clone(),
            metadata: encoded.metadata.clone(),
        };

        let err = put_metadata(
            Path((0, blob_id.clone())),
            State(state.clone()),
            Json(request.clone()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.error_code, "not_registered");

        let Json(status) = get_registration(
            Path((0, blob_id.clone())),
            Query(RegistrationQuery {
                digest: proof.digest.to_string(),
            }),
            State(state.clone()),
        )
        .await
        .unwrap();
        assert!(!status.registered);

        tokio::time::sleep(Duration::from_millis(250)).await;
        let status = put_metadata(Path((0, blob_id.clone())), State(state.clone()), Json(request))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let sliver = Bytes::from(encoded.slivers[0].clone());
        let status = put_sliver(Path((0, blob_id.clone(), 0)), State(state.clone()), sliver)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let Json(metadata) = get_metadata(Path((0, blob_id)), State(state))
            .await
            .unwrap();
        assert_eq!(metadata, encoded.metadata);
    }

    #[tokio::test]
    async fn proof_for_another_object_is_refused() {
        let ledger = InMemoryLedger::new();
        let state = DevnetState::new(Arc::new(ledger.clone()), 1, Vec::new());
        let (encoded, mut proof) = registered(&ledger, b"wrong object").await;
        proof.object_id = ObjectId(alloy::primitives::B256::repeat_byte(0xee));

        let err = put_metadata(
            Path((0, encoded.blob_id().to_string())),
            State(state),
            Json(PutMetadataRequest {
                registration: proof,
                metadata: encoded.metadata,
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn malformed_ids_are_bad_requests() {
        let state = DevnetState::new(Arc::new(InMemoryLedger::new()), 1, Vec::new());
        let err = get_metadata(Path((0, "not-hex".to_string())), State(state.clone()))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let missing = BlobId(alloy::primitives::B256::ZERO).to_string();
        let err = get_metadata(Path((4, missing)), State(state))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }
}
