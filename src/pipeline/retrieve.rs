// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Deliverable retrieval: fetch, parse, check identity, decrypt.

use chrono::{DateTime, Utc};

use crate::crypto::envelope::Envelope;
use crate::crypto::{identity, DecryptError, DecryptorCache};
use crate::models::{BlobId, DeliverableSubmission, Nonce, ObjectId, PolicyId};
use crate::session::{SessionCapability, SessionContext, SessionError};
use crate::storage::BlobReader;

#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    #[error("Session capability expired at {expired_at}")]
    SessionExpired { expired_at: DateTime<Utc> },

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Malformed deliverable data: {0}")]
    MalformedData(String),

    #[error("Deliverable unavailable: {0}")]
    Unavailable(String),

    #[error("Could not obtain a session capability: {0}")]
    Session(#[from] SessionError),
}

/// Downloads and decrypts deliverables.
pub struct RetrievalService {
    reader: BlobReader,
    decryptors: DecryptorCache,
}

impl RetrievalService {
    pub fn new(reader: BlobReader, decryptors: DecryptorCache) -> Self {
        Self {
            reader,
            decryptors,
        }
    }

    pub fn decryptors(&self) -> &DecryptorCache {
        &self.decryptors
    }

    pub async fn retrieve(
        &self,
        blob_id: &BlobId,
        object_id: &ObjectId,
        capability: &SessionCapability,
        policy_id: &PolicyId,
        nonce: &Nonce,
    ) -> Result<Vec<u8>, RetrieveError> {
        self.retrieve_at(blob_id, object_id, capability, policy_id, nonce, Utc::now())
            .await
    }

    /// [`Self::retrieve`] with an explicit clock.
    pub async fn retrieve_at(
        &self,
        blob_id: &BlobId,
        object_id: &ObjectId,
        capability: &SessionCapability,
        policy_id: &PolicyId,
        nonce: &Nonce,
        now: DateTime<Utc>,
    ) -> Result<Vec<u8>, RetrieveError> {
        // Expiry is a timestamp check, never a failed decrypt
        if capability.is_expired_at(now) {
            return Err(RetrieveError::SessionExpired {
                expired_at: capability.expires_at(),
            });
        }

        let bytes = self
            .reader
            .fetch(blob_id, object_id)
            .await
            .map_err(|e| RetrieveError::Unavailable(e.to_string()))?;

        self.open(&bytes, capability, policy_id, nonce).await
    }

    /// Parse and decrypt container bytes already in hand.
    pub async fn open(
        &self,
        bytes: &[u8],
        capability: &SessionCapability,
        policy_id: &PolicyId,
        nonce: &Nonce,
    ) -> Result<Vec<u8>, RetrieveError> {
        let envelope =
            Envelope::parse(bytes).map_err(|e| RetrieveError::MalformedData(e.to_string()))?;

        let expected = identity(policy_id, nonce);
        if envelope.header.id.as_ref() != expected.as_slice() {
            tracing::warn!(
                policy_id = %policy_id,
                nonce = %nonce,
                "Container identity does not match policy and nonce"
            );
            return Err(RetrieveError::AccessDenied(
                "identity does not match the requested policy and nonce".into(),
            ));
        }

        let decryptor = self
            .decryptors
            .decryptor_for(&envelope.header.services)
            .map_err(|e| decrypt_error(e, capability))?;
        let plaintext = decryptor
            .decrypt(&envelope, capability)
            .await
            .map_err(|e| decrypt_error(e, capability))?;

        tracing::info!(
            policy_id = %policy_id,
            holder = %capability.holder,
            plaintext_len = plaintext.len(),
            "Deliverable decrypted"
        );
        Ok(plaintext)
    }

    /// Retrieve a submission, obtaining the capability through `session`.
    pub async fn retrieve_submission(
        &self,
        submission: &DeliverableSubmission,
        session: &mut SessionContext,
    ) -> Result<Vec<u8>, RetrieveError> {
        let capability = session.capability().await?;
        self.retrieve(
            &submission.blob_id,
            &submission.blob_object_id,
            &capability,
            &submission.policy_id,
            &submission.nonce,
        )
        .await
    }
}

fn decrypt_error(e: DecryptError, capability: &SessionCapability) -> RetrieveError {
    match e {
        DecryptError::SessionExpired => RetrieveError::SessionExpired {
            expired_at: capability.expires_at(),
        },
        DecryptError::AccessDenied(msg) => RetrieveError::AccessDenied(msg),
        DecryptError::Unavailable(msg) => RetrieveError::Unavailable(msg),
        DecryptError::Corrupted(msg) => RetrieveError::MalformedData(msg),
    }
}
