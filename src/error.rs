// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! HTTP error responses for the development network.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::crypto::KeyServerError;
use crate::storage::node::NOT_REGISTERED;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error_code: &'static str,
    pub message: String,
}

/// JSON body of every error response.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error_code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, error_code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            error_code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "invalid_content", message)
    }

    /// The registration transaction is not visible to this node yet.
    pub fn not_registered(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, NOT_REGISTERED, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "unavailable", message)
    }
}

impl From<KeyServerError> for ApiError {
    fn from(e: KeyServerError) -> Self {
        let status = match &e {
            KeyServerError::SessionExpired | KeyServerError::InvalidCapability(_) => {
                StatusCode::UNAUTHORIZED
            }
            KeyServerError::AccessDenied(_) => StatusCode::FORBIDDEN,
            KeyServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            KeyServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, e.error_code(), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error_code: self.error_code.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}
