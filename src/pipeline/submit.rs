// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Deliverable submission: policy, nonce, encrypt, publish.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::crypto::{EncryptError, EncryptionClient};
use crate::ledger::{execute, Ledger, LedgerCall, LedgerError, Wallet};
use crate::models::{DeliverableFile, DeliverableSubmission, Nonce, PolicyId};
use crate::storage::{BlobPublisher, PublishError, PublishedBlob, RegisteredBlob};

/// Default upper bound on deliverable size (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Submission step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitStep {
    CreatePolicy,
    ReadFile,
    Encrypt,
    Publish,
}

/// Everything a submission needs besides the blob; kept when publishing
/// fails so the publish can be resumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSubmission {
    pub policy_id: PolicyId,
    pub nonce: Nonce,
    pub preview_url: String,
    pub file_name: String,
    pub file_size: u64,
}

impl PendingSubmission {
    fn complete(self, blob: PublishedBlob) -> DeliverableSubmission {
        DeliverableSubmission {
            blob_id: blob.blob_id,
            blob_object_id: blob.object_id,
            preview_url: self.preview_url,
            policy_id: self.policy_id,
            nonce: self.nonce,
            file_name: self.file_name,
            file_size: self.file_size,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("Access policy creation failed: {0}")]
    CreatePolicy(#[source] LedgerError),

    #[error("File is {size} bytes, limit is {limit}")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Could not read file: {0}")]
    ReadFile(#[from] std::io::Error),

    #[error("Nonce {nonce} was already issued under policy {policy_id}")]
    NonceReused { policy_id: PolicyId, nonce: Nonce },

    #[error("Encryption failed: {0}")]
    Encrypt(#[from] EncryptError),

    #[error("{source}")]
    Publish {
        pending: Box<PendingSubmission>,
        #[source]
        source: PublishError,
    },
}

impl SubmitError {
    pub fn step(&self) -> SubmitStep {
        match self {
            SubmitError::CreatePolicy(_) => SubmitStep::CreatePolicy,
            SubmitError::FileTooLarge { .. } | SubmitError::ReadFile(_) => SubmitStep::ReadFile,
            SubmitError::NonceReused { .. } | SubmitError::Encrypt(_) => SubmitStep::Encrypt,
            SubmitError::Publish { .. } => SubmitStep::Publish,
        }
    }
}

/// Sequences encryption and blob publishing into a [`DeliverableSubmission`].
pub struct SubmissionCoordinator {
    ledger: Arc<dyn Ledger>,
    encryption: EncryptionClient,
    publisher: BlobPublisher,
    max_file_size: u64,
    issued: Mutex<HashSet<(PolicyId, Nonce)>>,
}

impl SubmissionCoordinator {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        encryption: EncryptionClient,
        publisher: BlobPublisher,
    ) -> Self {
        Self {
            ledger,
            encryption,
            publisher,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            issued: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_max_file_size(mut self, limit: u64) -> Self {
        self.max_file_size = limit;
        self
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn publisher(&self) -> &BlobPublisher {
        &self.publisher
    }

    /// Submit a deliverable under a fresh policy and nonce.
    ///
    /// If a later step fails, the created policy is left without a blob.
    pub async fn submit(
        &self,
        file: &DeliverableFile,
        preview_url: &str,
        wallet: &Wallet,
    ) -> Result<DeliverableSubmission, SubmitError> {
        self.check_size(file.size())?;

        let effects = execute(self.ledger.as_ref(), &LedgerCall::CreatePolicy, wallet)
            .await
            .map_err(SubmitError::CreatePolicy)?;
        let policy_id = effects.created_policy().ok_or_else(|| {
            SubmitError::CreatePolicy(LedgerError::MissingEvent {
                digest: effects.digest,
                expected: "PolicyCreated",
            })
        })?;
        tracing::info!(policy_id = %policy_id, owner = %wallet.address(), "Access policy created");

        let nonce = Nonce::generate();
        let result = self
            .seal_and_publish(&policy_id, nonce, file, preview_url, wallet)
            .await;
        if let Err(e) = &result {
            tracing::warn!(
                policy_id = %policy_id,
                error = %e,
                "Submission failed, access policy left orphaned"
            );
        }
        result
    }

    /// Read `path` (bounded by the size limit) and submit it.
    pub async fn submit_path(
        &self,
        path: impl AsRef<Path>,
        preview_url: &str,
        wallet: &Wallet,
    ) -> Result<DeliverableSubmission, SubmitError> {
        let size = tokio::fs::metadata(path.as_ref()).await?.len();
        self.check_size(size)?;
        let file = DeliverableFile::read(path).await?;
        self.submit(&file, preview_url, wallet).await
    }

    /// Encrypt and publish under a caller-chosen policy and nonce.
    ///
    /// A `(policy, nonce)` pair is accepted once per coordinator.
    pub async fn seal_and_publish(
        &self,
        policy_id: &PolicyId,
        nonce: Nonce,
        file: &DeliverableFile,
        preview_url: &str,
        wallet: &Wallet,
    ) -> Result<DeliverableSubmission, SubmitError> {
        self.check_size(file.size())?;
        self.reserve(policy_id, &nonce)?;

        let ciphertext = self.encryption.encrypt(policy_id, &nonce, &file.bytes)?;
        tracing::debug!(
            policy_id = %policy_id,
            file_size = file.size(),
            ciphertext_len = ciphertext.len(),
            "Deliverable encrypted"
        );

        let pending = PendingSubmission {
            policy_id: *policy_id,
            nonce,
            preview_url: preview_url.to_string(),
            file_name: file.name.clone(),
            file_size: file.size(),
        };
        match self.publisher.publish(&ciphertext, wallet).await {
            Ok(blob) => Ok(finish(pending, blob)),
            Err(source) => Err(SubmitError::Publish {
                pending: Box::new(pending),
                source,
            }),
        }
    }

    /// Retry a failed publish from the upload phase.
    pub async fn resume(
        &self,
        pending: PendingSubmission,
        registered: RegisteredBlob,
        wallet: &Wallet,
    ) -> Result<DeliverableSubmission, SubmitError> {
        match self.publisher.resume(registered, wallet).await {
            Ok(blob) => Ok(finish(pending, blob)),
            Err(source) => Err(SubmitError::Publish {
                pending: Box::new(pending),
                source,
            }),
        }
    }

    fn check_size(&self, size: u64) -> Result<(), SubmitError> {
        if size > self.max_file_size {
            return Err(SubmitError::FileTooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        Ok(())
    }

    fn reserve(&self, policy_id: &PolicyId, nonce: &Nonce) -> Result<(), SubmitError> {
        let fresh = match self.issued.lock() {
            Ok(mut issued) => issued.insert((*policy_id, nonce.clone())),
            Err(poisoned) => poisoned.into_inner().insert((*policy_id, nonce.clone())),
        };
        if !fresh {
            return Err(SubmitError::NonceReused {
                policy_id: *policy_id,
                nonce: nonce.clone(),
            });
        }
        Ok(())
    }
}

fn finish(pending: PendingSubmission, blob: PublishedBlob) -> DeliverableSubmission {
    tracing::info!(
        policy_id = %pending.policy_id,
        blob_id = %blob.blob_id,
        object_id = %blob.object_id,
        file_size = pending.file_size,
        "Deliverable submitted"
    );
    pending.complete(blob)
}
