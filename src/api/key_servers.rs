// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    crypto::{key_server::KeyServerInfo, FetchKeyRequest, FetchKeyResponse, KeyServer},
    error::ApiError,
    state::DevnetState,
};

#[utoipa::path(
    get,
    path = "/key-servers",
    tag = "Key servers",
    responses((status = 200, body = [KeyServerInfo]))
)]
pub async fn list_key_servers(State(state): State<DevnetState>) -> Json<Vec<KeyServerInfo>> {
    Json(state.key_server_infos())
}

#[utoipa::path(
    post,
    path = "/key-servers/{index}/v1/fetch_key",
    params(("index" = usize, Path, description = "Key server index")),
    request_body = FetchKeyRequest,
    tag = "Key servers",
    responses(
        (status = 200, body = FetchKeyResponse),
        (status = 401, description = "Capability expired or invalid", body = crate::error::ErrorBody),
        (status = 403, description = "Holder is not a policy member", body = crate::error::ErrorBody)
    )
)]
pub async fn fetch_key(
    Path(index): Path<usize>,
    State(state): State<DevnetState>,
    Json(request): Json<FetchKeyRequest>,
) -> Result<Json<FetchKeyResponse>, ApiError> {
    let server = state.key_server(index)?;
    Ok(Json(server.fetch_key(&request).await?))
}
