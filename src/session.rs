// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Session capabilities.
//!
//! A [`SessionCapability`] is a short-lived, wallet-signed statement that
//! lets key servers authenticate the holder without a signature prompt per
//! request. It is valid for [`SESSION_TTL_SECS`] after creation and is never
//! persisted.
//!
//! [`SessionContext`] owns the connected wallet and the active capability.
//! Pass it explicitly to whatever needs to decrypt; contexts are not shared
//! between callers.

use alloy::primitives::{Address, Bytes, Signature};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::{SigningError, Wallet};
use crate::models::Identity;

/// Capability lifetime (10 minutes).
pub const SESSION_TTL_SECS: i64 = 600;

/// Clock difference tolerated between holder and verifier.
pub const MAX_CLOCK_SKEW_SECS: i64 = 30;

/// Errors raised while creating or verifying a session capability.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session capability expired at {expired_at}")]
    Expired { expired_at: DateTime<Utc> },

    #[error("Session capability not valid before {created_at}")]
    NotYetValid { created_at: DateTime<Utc> },

    #[error("Invalid session signature: {0}")]
    InvalidSignature(String),

    #[error("Wallet could not sign the session challenge: {0}")]
    Signing(#[from] SigningError),
}

/// Wallet-signed, time-limited authorization to request key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCapability {
    pub holder: Identity,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: i64,
    /// EIP-191 signature over [`SessionCapability::challenge`].
    pub signature: Bytes,
}

impl SessionCapability {
    /// Ask the wallet to sign a fresh capability created at `now`.
    pub async fn request(wallet: &Wallet, now: DateTime<Utc>) -> Result<Self, SessionError> {
        let holder = wallet.address();
        let message = Self::challenge(&holder, &now, SESSION_TTL_SECS);
        let signature = wallet.sign_message(message.as_bytes()).await?;

        tracing::debug!(holder = %holder, created_at = %now, "Session capability signed");
        Ok(Self {
            holder,
            created_at: now,
            ttl_secs: SESSION_TTL_SECS,
            signature: Bytes::from(signature.as_bytes().to_vec()),
        })
    }

    /// Message the holder signs.
    pub fn challenge(holder: &Address, created_at: &DateTime<Utc>, ttl_secs: i64) -> String {
        format!(
            "GigNova session key\nholder: {holder}\ncreated_at: {}\nttl_secs: {ttl_secs}",
            created_at.to_rfc3339()
        )
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(self.ttl_secs)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Check the validity window, then that the signature recovers to the
    /// holder.
    pub fn verify(&self, now: DateTime<Utc>) -> Result<(), SessionError> {
        if self.is_expired_at(now) {
            return Err(SessionError::Expired {
                expired_at: self.expires_at(),
            });
        }
        if self.created_at > now + Duration::seconds(MAX_CLOCK_SKEW_SECS) {
            return Err(SessionError::NotYetValid {
                created_at: self.created_at,
            });
        }
        if self.ttl_secs <= 0 || self.ttl_secs > SESSION_TTL_SECS {
            return Err(SessionError::InvalidSignature(format!(
                "unsupported ttl {}",
                self.ttl_secs
            )));
        }

        let signature = Signature::try_from(self.signature.as_ref())
            .map_err(|e| SessionError::InvalidSignature(e.to_string()))?;
        let message = Self::challenge(&self.holder, &self.created_at, self.ttl_secs);
        let recovered = signature
            .recover_address_from_msg(message.as_bytes())
            .map_err(|e| SessionError::InvalidSignature(e.to_string()))?;

        if recovered != self.holder {
            return Err(SessionError::InvalidSignature(format!(
                "signed by {recovered}, not {}",
                self.holder
            )));
        }
        Ok(())
    }
}

/// Connected wallet plus its active capability.
#[derive(Debug)]
pub struct SessionContext {
    wallet: Wallet,
    capability: Option<SessionCapability>,
}

impl SessionContext {
    pub fn new(wallet: Wallet) -> Self {
        Self {
            wallet,
            capability: None,
        }
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    pub fn holder(&self) -> Identity {
        self.wallet.address()
    }

    /// Active capability, signing a new one if none exists or it expired.
    pub async fn capability(&mut self) -> Result<SessionCapability, SessionError> {
        self.capability_at(Utc::now()).await
    }

    pub async fn capability_at(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<SessionCapability, SessionError> {
        if let Some(current) = &self.capability {
            if !current.is_expired_at(now) {
                return Ok(current.clone());
            }
            tracing::info!(
                holder = %current.holder,
                expired_at = %current.expires_at(),
                "Session capability expired, requesting a new one"
            );
            self.capability = None;
        }

        let fresh = SessionCapability::request(&self.wallet, now).await?;
        self.capability = Some(fresh.clone());
        Ok(fresh)
    }

    /// Drop the active capability (wallet disconnected or switched).
    pub fn disconnect(&mut self) {
        self.capability = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_capability_verifies() {
        let wallet = Wallet::random().unwrap();
        let now = Utc::now();
        let cap = SessionCapability::request(&wallet, now).await.unwrap();

        assert_eq!(cap.holder, wallet.address());
        assert_eq!(cap.expires_at(), now + Duration::minutes(10));
        assert!(cap.verify(now + Duration::minutes(9)).is_ok());
    }

    #[tokio::test]
    async fn expiry_is_a_timestamp_check() {
        let wallet = Wallet::random().unwrap();
        let now = Utc::now();
        let cap = SessionCapability::request(&wallet, now).await.unwrap();

        assert!(!cap.is_expired_at(now + Duration::seconds(599)));
        assert!(cap.is_expired_at(now + Duration::seconds(600)));
        assert!(matches!(
            cap.verify(now + Duration::minutes(11)),
            Err(SessionError::Expired { .. })
        ));
    }

    #[tokio::test]
    async fn forged_holder_is_rejected() {
        let wallet = Wallet::random().unwrap();
        let other = Wallet::random().unwrap();
        let now = Utc::now();

        let mut cap = SessionCapability::request(&wallet, now).await.unwrap();
        cap.holder = other.address();
        assert!(matches!(cap.verify(now), Err(SessionError::InvalidSignature(_))));

        let mut stretched = SessionCapability::request(&wallet, now).await.unwrap();
        stretched.ttl_secs = 3600;
        assert!(stretched.verify(now).is_err());
    }

    #[tokio::test]
    async fn future_dated_capability_is_rejected() {
        let wallet = Wallet::random().unwrap();
        let now = Utc::now();

        let cap = SessionCapability::request(&wallet, now + Duration::days(365))
            .await
            .unwrap();
        assert!(!cap.is_expired_at(now + Duration::days(1)));
        assert!(matches!(
            cap.verify(now + Duration::days(1)),
            Err(SessionError::NotYetValid { .. })
        ));

        let skewed = SessionCapability::request(&wallet, now + Duration::seconds(10))
            .await
            .unwrap();
        assert!(skewed.verify(now).is_ok());
    }

    #[tokio::test]
    async fn context_reuses_then_regenerates() {
        let mut ctx = SessionContext::new(Wallet::random().unwrap());
        let start = Utc::now();

        let first = ctx.capability_at(start).await.unwrap();
        let again = ctx
            .capability_at(start + Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(first, again);

        let later = start + Duration::minutes(10) + Duration::seconds(1);
        let renewed = ctx.capability_at(later).await.unwrap();
        assert_ne!(renewed, first);
        assert_eq!(renewed.created_at, later);
        assert!(renewed.verify(later).is_ok());
    }

    #[tokio::test]
    async fn disconnect_discards_capability() {
        let mut ctx = SessionContext::new(Wallet::random().unwrap());
        let now = Utc::now();
        let first = ctx.capability_at(now).await.unwrap();

        ctx.disconnect();
        let second = ctx.capability_at(now + Duration::seconds(1)).await.unwrap();
        assert_ne!(first.created_at, second.created_at);
    }
}
