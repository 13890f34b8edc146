// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    crypto::{key_server::KeyServerInfo, FetchKeyRequest, FetchKeyResponse},
    error::ErrorBody,
    state::DevnetState,
    storage::{
        node::{PutMetadataRequest, RegistrationProof, RegistrationStatus},
        BlobMetadata,
    },
};

pub mod aggregator;
pub mod health;
pub mod key_servers;
pub mod nodes;

/// Largest accepted request body (one sliver of a maximum-size deliverable).
const MAX_BODY_BYTES: usize = 128 * 1024 * 1024;

pub fn router(state: DevnetState) -> Router {
    let routes = Router::new()
        .route(
            "/nodes/{node}/v1/blobs/{blob_id}/metadata",
            get(nodes::get_metadata).put(nodes::put_metadata),
        )
        .route(
            "/nodes/{node}/v1/blobs/{blob_id}/slivers/{index}",
            get(nodes::get_sliver).put(nodes::put_sliver),
        )
        .route(
            "/nodes/{node}/v1/blobs/{blob_id}/registration",
            get(nodes::get_registration),
        )
        .route("/aggregator/v1/blobs/{blob_id}", get(aggregator::get_blob))
        .route("/key-servers", get(key_servers::list_key_servers))
        .route(
            "/key-servers/{index}/v1/fetch_key",
            post(key_servers::fetch_key),
        )
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state);

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        nodes::put_metadata,
        nodes::put_sliver,
        nodes::get_metadata,
        nodes::get_sliver,
        nodes::get_registration,
        aggregator::get_blob,
        key_servers::list_key_servers,
        key_servers::fetch_key,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            BlobMetadata,
            PutMetadataRequest,
            RegistrationProof,
            RegistrationStatus,
            KeyServerInfo,
            FetchKeyRequest,
            FetchKeyResponse,
            ErrorBody,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse
        )
    ),
    tags(
        (name = "Storage nodes", description = "Sliver and metadata storage"),
        (name = "Aggregator", description = "Whole-blob reads"),
        (name = "Key servers", description = "Share mask release to policy members"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::ledger::InMemoryLedger;
    use crate::state::key_servers_from_seed;

    fn state() -> DevnetState {
        let ledger: Arc<InMemoryLedger> = Arc::new(InMemoryLedger::new());
        let servers =
            key_servers_from_seed(b"router", 2, "http://localhost:8090", ledger.clone()).unwrap();
        DevnetState::new(ledger, 3, servers)
    }

    #[tokio::test]
    async fn health_and_listing_respond() {
        let app = router(state());

        let response = app
            .clone()
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::get("/key-servers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let servers: Vec<KeyServerInfo> = serde_json::from_slice(&body).unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[1].url, "http://localhost:8090/key-servers/1");
    }

    #[tokio::test]
    async fn unknown_blob_is_not_found() {
        let app = router(state());
        let uri = format!("/aggregator/v1/blobs/{}", alloy::primitives::B256::ZERO);
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(error["error_code"], "not_found");
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let response = router(state())
            .oneshot(
                Request::get("/api-doc/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
