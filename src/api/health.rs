// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::DevnetState;

/// Readiness response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    pub service: String,
    /// Ledger view reachability.
    pub ledger: String,
    /// Current storage epoch, when the ledger answered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u32>,
    pub storage_nodes: usize,
    pub key_servers: usize,
}

/// Liveness response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness probe. Does not check dependencies.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses((status = 200, description = "Service is alive", body = HealthResponse))
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness probe. Returns 503 if the ledger view is unreachable.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Service is not ready", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<DevnetState>) -> (StatusCode, Json<ReadyResponse>) {
    let epoch = match state.ledger.current_epoch().await {
        Ok(epoch) => Some(epoch),
        Err(e) => {
            tracing::warn!(error = %e, "Ledger unreachable");
            None
        }
    };
    let ok = epoch.is_some();

    let response = ReadyResponse {
        status: if ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            ledger: if ok { "ok" } else { "unavailable" }.to_string(),
            epoch,
            storage_nodes: state.nodes.len(),
            key_servers: state.key_servers.len(),
        },
    };
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
