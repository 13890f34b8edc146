// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! # Domain Models
//!
//! Identifiers and records shared by the ledger, storage, encryption and
//! pipeline modules.
//!
//! ## Identifier Types
//!
//! All on-chain identifiers are 32-byte values. Each gets its own newtype so
//! a policy id can never be passed where a blob id is expected:
//!
//! - [`PolicyId`] - access policy object gating decryption rights
//! - [`BlobId`] - content identifier derived from the encoded blob
//! - [`ObjectId`] - on-chain registration object of a stored blob
//!
//! Participant identities are EVM addresses ([`Identity`]).

use alloy::primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

/// Participant identity (wallet address).
pub type Identity = Address;

/// Transaction digest returned by the ledger on submission.
pub type TxDigest = B256;

/// Marketplace job identifier.
pub type JobId = u64;

// =============================================================================
// Identifier Types
// =============================================================================

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[serde(transparent)]
        pub struct $name(pub B256);

        impl $name {
            /// Raw 32 bytes of the identifier.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0 .0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = alloy::hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <B256 as std::str::FromStr>::from_str(s).map($name)
            }
        }

        impl From<B256> for $name {
            fn from(value: B256) -> Self {
                $name(value)
            }
        }
    };
}

id_newtype!(
    /// On-chain access policy whose member set gates decryption rights.
    PolicyId
);

id_newtype!(
    /// Content identifier of an encoded blob.
    ///
    /// Derived deterministically from the encoded slivers, so identical
    /// content always maps to the same id.
    BlobId
);

id_newtype!(
    /// On-chain object recording a blob registration (owner, size, epochs).
    ObjectId
);

// =============================================================================
// Nonce
// =============================================================================

/// Per-submission nonce.
///
/// Concatenated after the policy id bytes to form the encryption identity,
/// so a nonce must never repeat under the same policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    /// Fresh random nonce (UUIDv4).
    pub fn generate() -> Self {
        Nonce(Uuid::new_v4().to_string())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Nonce {
    fn from(value: &str) -> Self {
        Nonce(value.to_string())
    }
}

impl From<String> for Nonce {
    fn from(value: String) -> Self {
        Nonce(value)
    }
}

// =============================================================================
// Deliverables
// =============================================================================

/// A deliverable file held fully in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverableFile {
    /// Display name (NFC-normalized, no path components).
    pub name: String,
    /// File contents.
    pub bytes: Vec<u8>,
}

impl DeliverableFile {
    /// Wrap in-memory bytes under the given display name.
    pub fn new(name: impl AsRef<str>, bytes: Vec<u8>) -> Self {
        Self {
            name: normalize_file_name(name.as_ref()),
            bytes,
        }
    }

    /// Read a file from disk in one piece.
    pub async fn read(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Normalize a user-supplied file name: NFC, last path component only,
/// trimmed, never empty.
pub fn normalize_file_name(raw: &str) -> String {
    let normalized: String = raw.nfc().collect();
    let base = normalized
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() {
        "deliverable".to_string()
    } else {
        base.to_string()
    }
}

/// Record of an encrypted milestone deliverable.
///
/// Created once per milestone submission and embedded in the on-chain
/// milestone record. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliverableSubmission {
    /// Content id of the ciphertext blob.
    pub blob_id: BlobId,
    /// Registration object of the blob, used by the fallback read path.
    pub blob_object_id: ObjectId,
    /// Public, unencrypted preview.
    pub preview_url: String,
    /// Policy the ciphertext is bound to.
    pub policy_id: PolicyId,
    /// Nonce the ciphertext is bound to.
    pub nonce: Nonce,
    /// Original file name.
    pub file_name: String,
    /// Original (plaintext) file size in bytes.
    pub file_size: u64,
}

// =============================================================================
// Marketplace Records
// =============================================================================

/// Lifecycle of a milestone as tracked by the marketplace contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneState {
    Open,
    Submitted,
    Approved,
}

impl MilestoneState {
    /// Decode the contract's `uint8` state.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(MilestoneState::Open),
            1 => Some(MilestoneState::Submitted),
            2 => Some(MilestoneState::Approved),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            MilestoneState::Open => 0,
            MilestoneState::Submitted => 1,
            MilestoneState::Approved => 2,
        }
    }
}

/// Milestone as read back from the ledger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MilestoneRecord {
    pub job_id: JobId,
    pub index: u32,
    pub state: MilestoneState,
    pub client: Identity,
    pub freelancer: Option<Identity>,
    pub submission: Option<DeliverableSubmission>,
}
