// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Key servers.
//!
//! A key server releases the mask for one share of an encrypted container
//! to any holder of a valid session capability who is a member of the
//! policy named by the first 32 bytes of the encryption identity.
//!
//! - [`LocalKeyServer`]: in-process server reading membership from a
//!   [`Ledger`]; the devnet serves these over HTTP
//! - [`HttpKeyServer`]: client for a remote server

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Bytes, B256};
use async_trait::async_trait;
use chrono::Utc;
use k256::SecretKey;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::keys::{decode_public_key, encode_public_key, share_mask};
use crate::ledger::{Ledger, LedgerObject, ObjectRef};
use crate::models::PolicyId;
use crate::session::{SessionCapability, SessionError};

/// Default timeout for key server requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors returned by key servers.
#[derive(Debug, thiserror::Error)]
pub enum KeyServerError {
    #[error("Session capability expired")]
    SessionExpired,

    #[error("Invalid session capability: {0}")]
    InvalidCapability(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Bad key request: {0}")]
    BadRequest(String),

    #[error("Key server unavailable: {0}")]
    Unavailable(String),
}

impl KeyServerError {
    /// Stable code carried in HTTP error bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            KeyServerError::SessionExpired => "session_expired",
            KeyServerError::InvalidCapability(_) => "invalid_capability",
            KeyServerError::AccessDenied(_) => "access_denied",
            KeyServerError::BadRequest(_) => "bad_request",
            KeyServerError::Unavailable(_) => "unavailable",
        }
    }

    fn from_code(code: &str, message: String) -> Self {
        match code {
            "session_expired" => KeyServerError::SessionExpired,
            "invalid_capability" => KeyServerError::InvalidCapability(message),
            "access_denied" => KeyServerError::AccessDenied(message),
            "bad_request" => KeyServerError::BadRequest(message),
            _ => KeyServerError::Unavailable(message),
        }
    }
}

impl From<SessionError> for KeyServerError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Expired { .. } => KeyServerError::SessionExpired,
            other => KeyServerError::InvalidCapability(other.to_string()),
        }
    }
}

/// Request for the mask of one share.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FetchKeyRequest {
    /// Encryption identity, hex encoded.
    #[schema(value_type = String)]
    pub id: Bytes,
    /// Ephemeral public key recorded for this server, hex encoded.
    #[schema(value_type = String)]
    pub ephemeral_key: Bytes,
    pub share_index: u8,
    #[schema(value_type = Object)]
    pub capability: SessionCapability,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FetchKeyResponse {
    /// 32-byte share mask, hex encoded.
    #[schema(value_type = String)]
    pub mask: Bytes,
}

/// Public description of a key server, recorded in every container it
/// participates in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct KeyServerInfo {
    #[schema(value_type = String)]
    pub object_id: B256,
    pub url: String,
    /// Compressed SEC1 public key, hex encoded.
    #[schema(value_type = String)]
    pub public_key: Bytes,
}

/// Releases share masks to authorized policy members.
#[async_trait]
pub trait KeyServer: Send + Sync {
    async fn fetch_key(
        &self,
        request: &FetchKeyRequest,
    ) -> Result<FetchKeyResponse, KeyServerError>;
}

/// In-process key server.
pub struct LocalKeyServer {
    object_id: B256,
    url: String,
    secret: SecretKey,
    ledger: Arc<dyn Ledger>,
}

impl LocalKeyServer {
    pub fn new(
        object_id: B256,
        url: impl Into<String>,
        secret: SecretKey,
        ledger: Arc<dyn Ledger>,
    ) -> Self {
        Self {
            object_id,
            url: url.into(),
            secret,
            ledger,
        }
    }

    pub fn info(&self) -> KeyServerInfo {
        KeyServerInfo {
            object_id: self.object_id,
            url: self.url.clone(),
            public_key: Bytes::from(encode_public_key(&self.secret.public_key())),
        }
    }

    async fn authorize(&self, request: &FetchKeyRequest) -> Result<(), KeyServerError> {
        request.capability.verify(Utc::now())?;

        let policy_bytes = request
            .id
            .get(..32)
            .ok_or_else(|| KeyServerError::BadRequest("identity shorter than a policy id".into()))?;
        let policy_id = PolicyId(B256::from_slice(policy_bytes));
        let holder = request.capability.holder;

        let policy = self
            .ledger
            .read_object(ObjectRef::Policy(policy_id))
            .await
            .map_err(|e| KeyServerError::Unavailable(e.to_string()))?;

        match policy {
            Some(LedgerObject::AccessPolicy(policy)) if policy.is_member(&holder) => Ok(()),
            Some(LedgerObject::AccessPolicy(_)) => Err(KeyServerError::AccessDenied(format!(
                "{holder} is not a member of policy {policy_id}"
            ))),
            _ => Err(KeyServerError::AccessDenied(format!("policy {policy_id} not found"))),
        }
    }
}

#[async_trait]
impl KeyServer for LocalKeyServer {
    async fn fetch_key(
        &self,
        request: &FetchKeyRequest,
    ) -> Result<FetchKeyResponse, KeyServerError> {
        if let Err(e) = self.authorize(request).await {
            tracing::warn!(
                key_server = %self.object_id,
                holder = %request.capability.holder,
                error_code = e.error_code(),
                "Key request refused"
            );
            return Err(e);
        }

        let ephemeral = decode_public_key(&request.ephemeral_key)
            .map_err(|e| KeyServerError::BadRequest(e.to_string()))?;
        let mask = share_mask(&self.secret, &ephemeral, &request.id, request.share_index)
            .map_err(|e| KeyServerError::Unavailable(e.to_string()))?;

        tracing::info!(
            key_server = %self.object_id,
            holder = %request.capability.holder,
            share_index = request.share_index,
            "Share mask released"
        );
        Ok(FetchKeyResponse {
            mask: Bytes::from(mask.to_vec()),
        })
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

/// HTTP client for a remote key server.
#[derive(Clone)]
pub struct HttpKeyServer {
    base_url: String,
    client: reqwest::Client,
}

impl HttpKeyServer {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl KeyServer for HttpKeyServer {
    async fn fetch_key(
        &self,
        request: &FetchKeyRequest,
    ) -> Result<FetchKeyResponse, KeyServerError> {
        let url = format!("{}/v1/fetch_key", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| KeyServerError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| KeyServerError::Unavailable(e.to_string()));
        }

        let body: ErrorBody = response.json().await.unwrap_or(ErrorBody {
            error_code: String::new(),
            message: String::new(),
        });
        let message = if body.message.is_empty() {
            format!("HTTP {status} from {url}")
        } else {
            body.message
        };
        Err(KeyServerError::from_code(&body.error_code, message))
    }
}

/// HTTP client with the default key server timeout.
pub fn default_http_client() -> Result<reqwest::Client, KeyServerError> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .map_err(|e| KeyServerError::Unavailable(e.to_string()))
}

/// Fetch the key server listing published at `directory_url`.
pub async fn fetch_directory(
    client: &reqwest::Client,
    directory_url: &str,
) -> Result<Vec<KeyServerInfo>, KeyServerError> {
    let response = client
        .get(directory_url)
        .send()
        .await
        .map_err(|e| KeyServerError::Unavailable(e.to_string()))?;

    if !response.status().is_success() {
        return Err(KeyServerError::Unavailable(format!(
            "HTTP {} from key server directory",
            response.status()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| KeyServerError::Unavailable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::signing::random_secret_key;
    use crate::ledger::{execute, InMemoryLedger, LedgerCall, Wallet};
    use chrono::Duration as ChronoDuration;

    async fn setup() -> (InMemoryLedger, LocalKeyServer, Wallet, PolicyId) {
        let ledger = InMemoryLedger::new();
        let owner = Wallet::random().unwrap();
        let policy_id = execute(&ledger, &LedgerCall::CreatePolicy, &owner)
            .await
            .unwrap()
            .created_policy()
            .unwrap();
        let server = LocalKeyServer::new(
            B256::repeat_byte(0x51),
            "http://localhost/key-servers/0",
            random_secret_key().unwrap(),
            Arc::new(ledger.clone()),
        );
        (ledger, server, owner, policy_id)
    }

    fn request(policy_id: PolicyId, capability: SessionCapability) -> (FetchKeyRequest, SecretKey) {
        let ephemeral = random_secret_key().unwrap();
        let mut id = policy_id.as_bytes().to_vec();
        id.extend_from_slice(b"nonce");
        (
            FetchKeyRequest {
                id: Bytes::from(id),
                ephemeral_key: Bytes::from(encode_public_key(&ephemeral.public_key())),
                share_index: 0,
                capability,
            },
            ephemeral,
        )
    }

    #[tokio::test]
    async fn member_receives_matching_mask() {
        let (_ledger, server, owner, policy_id) = setup().await;
        let cap = SessionCapability::request(&owner, Utc::now())
            .await
            .unwrap();
        let (req, ephemeral) = request(policy_id, cap);

        let response = server.fetch_key(&req).await.unwrap();
        let server_pk = decode_public_key(&server.info().public_key).unwrap();
        let expected = share_mask(&ephemeral, &server_pk, &req.id, 0).unwrap();
        assert_eq!(response.mask.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn non_member_is_denied() {
        let (_ledger, server, _owner, policy_id) = setup().await;
        let stranger = Wallet::random().unwrap();
        let cap = SessionCapability::request(&stranger, Utc::now())
            .await
            .unwrap();
        let (req, _) = request(policy_id, cap);

        let err = server.fetch_key(&req).await.unwrap_err();
        assert!(matches!(err, KeyServerError::AccessDenied(_)));
        assert_eq!(err.error_code(), "access_denied");
    }

    #[tokio::test]
    async fn expired_capability_is_refused() {
        let (_ledger, server, owner, policy_id) = setup().await;
        let cap = SessionCapability::request(&owner, Utc::now() - ChronoDuration::minutes(11))
            .await
            .unwrap();
        let (req, _) = request(policy_id, cap);

        assert!(matches!(
            server.fetch_key(&req).await,
            Err(KeyServerError::SessionExpired)
        ));
    }

    #[tokio::test]
    async fn future_dated_capability_is_refused() {
        let (_ledger, server, owner, policy_id) = setup().await;
        let cap = SessionCapability::request(&owner, Utc::now() + ChronoDuration::days(365))
            .await
            .unwrap();
        let (req, _) = request(policy_id, cap);

        assert!(matches!(
            server.fetch_key(&req).await,
            Err(KeyServerError::InvalidCapability(_))
        ));
    }

    #[tokio::test]
    async fn short_identity_is_a_bad_request() {
        let (_ledger, server, owner, _policy_id) = setup().await;
        let cap = SessionCapability::request(&owner, Utc::now())
            .await
            .unwrap();
        let (mut req, _) = request(PolicyId(B256::ZERO), cap);
        req.id = Bytes::from(vec![1u8; 8]);

        assert!(matches!(
            server.fetch_key(&req).await,
            Err(KeyServerError::BadRequest(_))
        ));
    }

    #[test]
    fn error_codes_round_trip() {
        for err in [
            KeyServerError::SessionExpired,
            KeyServerError::AccessDenied("x".into()),
            KeyServerError::InvalidCapability("x".into()),
            KeyServerError::BadRequest("x".into()),
        ] {
            let code = err.error_code();
            assert_eq!(
                KeyServerError::from_code(code, "x".into()).error_code(),
                code
            );
        }
        assert!(matches!(
            KeyServerError::from_code("", "boom".into()),
            KeyServerError::Unavailable(_)
        ));
    }
}
