// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Blob encoding.
//!
//! A blob is split into `k` equal data slivers plus one XOR parity sliver,
//! so any single missing or corrupted sliver can be rebuilt. The blob id
//! commits to `k`, the unencoded length and every sliver digest.

use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use crate::models::BlobId;

const BLOB_ID_DOMAIN: &[u8] = b"gignova/blob-id/v1";

/// Errors raised while decoding a blob.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Metadata does not match blob id {0}")]
    MetadataMismatch(BlobId),

    #[error("Metadata is inconsistent: {0}")]
    InvalidMetadata(String),

    #[error("{missing} slivers missing, at most one can be recovered")]
    TooManyMissing { missing: usize },
}

/// Sliver layout of an encoded blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BlobMetadata {
    #[schema(value_type = String)]
    pub blob_id: BlobId,
    /// Unencoded length in bytes.
    pub size: u64,
    /// Number of data slivers (`k`). Sliver `k` is the parity sliver.
    pub data_slivers: u16,
    pub sliver_len: u64,
    /// SHA-256 of each sliver, parity last.
    #[schema(value_type = Vec<String>)]
    pub sliver_digests: Vec<B256>,
}

impl BlobMetadata {
    pub fn sliver_count(&self) -> usize {
        self.data_slivers as usize + 1
    }

    /// Recompute the blob id and check internal consistency.
    pub fn verify(&self) -> Result<(), EncodingError> {
        if self.data_slivers == 0 {
            return Err(EncodingError::InvalidMetadata("no data slivers".into()));
        }
        if self.sliver_digests.len() != self.sliver_count() {
            return Err(EncodingError::InvalidMetadata("digest count".into()));
        }
        let capacity = self.sliver_len.checked_mul(u64::from(self.data_slivers));
        let expected_len = self.size.div_ceil(u64::from(self.data_slivers));
        if capacity.is_none() || self.sliver_len != expected_len {
            return Err(EncodingError::InvalidMetadata("sliver length".into()));
        }
        if blob_id_for(self.data_slivers, self.size, &self.sliver_digests) != self.blob_id {
            return Err(EncodingError::MetadataMismatch(self.blob_id));
        }
        Ok(())
    }

    pub fn sliver_matches(&self, index: usize, sliver: &[u8]) -> bool {
        sliver.len() as u64 == self.sliver_len
            && self
                .sliver_digests
                .get(index)
                .is_some_and(|digest| *digest == sliver_digest(sliver))
    }
}

/// Encoded blob ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlob {
    pub metadata: BlobMetadata,
    pub slivers: Vec<Vec<u8>>,
}

impl EncodedBlob {
    pub fn blob_id(&self) -> BlobId {
        self.metadata.blob_id
    }
}

/// Number of data slivers for a network of `nodes` storage nodes.
pub fn data_sliver_count(nodes: usize) -> u16 {
    nodes.saturating_sub(1).clamp(1, u16::MAX as usize) as u16
}

pub fn sliver_digest(sliver: &[u8]) -> B256 {
    B256::from_slice(&Sha256::digest(sliver))
}

pub fn blob_id_for(data_slivers: u16, size: u64, digests: &[B256]) -> BlobId {
    let mut hasher = Sha256::new();
    hasher.update(BLOB_ID_DOMAIN);
    hasher.update(data_slivers.to_be_bytes());
    hasher.update(size.to_be_bytes());
    for digest in digests {
        hasher.update(digest.as_slice());
    }
    BlobId(B256::from_slice(&hasher.finalize()))
}

/// Encode `data` for `nodes` storage nodes. Deterministic.
pub fn encode(data: &[u8], nodes: usize) -> EncodedBlob {
    encode_slivers(data, data_sliver_count(nodes))
}

/// Encode `data` into `k` data slivers plus parity.
pub fn encode_slivers(data: &[u8], k: u16) -> EncodedBlob {
    let k = k.max(1);
    let size = data.len() as u64;
    let sliver_len = size.div_ceil(u64::from(k)) as usize;

    let mut slivers: Vec<Vec<u8>> = (0..k as usize)
        .map(|i| {
            let start = (i * sliver_len).min(data.len());
            let end = (start + sliver_len).min(data.len());
            let mut sliver = data[start..end].to_vec();
            sliver.resize(sliver_len, 0);
            sliver
        })
        .collect();

    let mut parity = vec![0u8; sliver_len];
    for sliver in &slivers {
        xor_into(&mut parity, sliver);
    }
    slivers.push(parity);

    let sliver_digests: Vec<B256> = slivers.iter().map(|s| sliver_digest(s)).collect();
    let metadata = BlobMetadata {
        blob_id: blob_id_for(k, size, &sliver_digests),
        size,
        data_slivers: k,
        sliver_len: sliver_len as u64,
        sliver_digests,
    };
    EncodedBlob { metadata, slivers }
}

/// Rebuild the blob from whatever slivers were retrieved.
///
/// Slivers whose digest does not match the metadata count as missing.
pub fn decode(
    metadata: &BlobMetadata,
    slivers: Vec<Option<Vec<u8>>>,
) -> Result<Vec<u8>, EncodingError> {
    metadata.verify()?;
    let count = metadata.sliver_count();

    let mut slivers: Vec<Option<Vec<u8>>> = slivers
        .into_iter()
        .chain(std::iter::repeat(None))
        .take(count)
        .enumerate()
        .map(|(i, sliver)| sliver.filter(|s| metadata.sliver_matches(i, s)))
        .collect();

    let missing: Vec<usize> = (0..count).filter(|i| slivers[*i].is_none()).collect();
    match missing.as_slice() {
        [] => {}
        [lost] => {
            let mut rebuilt = vec![0u8; metadata.sliver_len as usize];
            for sliver in slivers.iter().flatten() {
                xor_into(&mut rebuilt, sliver);
            }
            slivers[*lost] = Some(rebuilt);
        }
        _ => {
            return Err(EncodingError::TooManyMissing {
                missing: missing.len(),
            })
        }
    }

    let mut data = Vec::with_capacity(metadata.size as usize);
    for sliver in slivers.into_iter().take(metadata.data_slivers as usize).flatten() {
        data.extend_from_slice(&sliver);
    }
    data.truncate(metadata.size as usize);
    Ok(data)
}

fn xor_into(acc: &mut [u8], other: &[u8]) {
    for (a, b) in acc.iter_mut().zip(other) {
        *a ^= b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all(encoded: &EncodedBlob) -> Vec<Option<Vec<u8>>> {
        encoded.slivers.iter().cloned().map(Some).collect()
    }

    #[test]
    fn encoding_is_deterministic() {
        let data = b"the same ciphertext twice".to_vec();
        let a = encode(&data, 4);
        let b = encode(&data, 4);
        assert_eq!(a, b);
        assert_ne!(a.blob_id(), encode(b"different", 4).blob_id());
        // Layout is part of the id
        assert_ne!(a.blob_id(), encode(&data, 5).blob_id());
    }

    #[test]
    fn recorded_sliver_count_reproduces_the_id() {
        let data = b"published to four nodes".to_vec();
        let published = encode(&data, 4);
        let k = published.metadata.data_slivers;
        assert_eq!(encode_slivers(&data, k), published);
        assert_ne!(encode(&data, 3).blob_id(), published.blob_id());
    }

    #[test]
    fn decodes_with_all_slivers() {
        for nodes in 1..6 {
            let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
            let encoded = encode(&data, nodes);
            assert_eq!(encoded.slivers.len(), encoded.metadata.sliver_count());
            assert_eq!(decode(&encoded.metadata, all(&encoded)).unwrap(), data);
        }
    }

    #[test]
    fn recovers_any_single_lost_sliver() {
        let data = b"0123456789abcdefghij-odd-length".to_vec();
        let encoded = encode(&data, 4);
        for lost in 0..encoded.slivers.len() {
            let mut slivers = all(&encoded);
            slivers[lost] = None;
            assert_eq!(decode(&encoded.metadata, slivers).unwrap(), data);
        }
    }

    #[test]
    fn corrupted_sliver_is_treated_as_missing() {
        let data = vec![7u8; 300];
        let encoded = encode(&data, 3);
        let mut slivers = all(&encoded);
        if let Some(Some(first)) = slivers.first_mut() {
            first[0] ^= 1;
        }
        assert_eq!(decode(&encoded.metadata, slivers).unwrap(), data);

        let mut two_lost = all(&encoded);
        two_lost[0] = None;
        two_lost[1] = None;
        assert_eq!(
            decode(&encoded.metadata, two_lost),
            Err(EncodingError::TooManyMissing { missing: 2 })
        );
    }

    #[test]
    fn empty_blob_round_trips() {
        let encoded = encode(&[], 4);
        assert_eq!(encoded.metadata.size, 0);
        assert_eq!(encoded.metadata.sliver_len, 0);
        assert!(decode(&encoded.metadata, all(&encoded)).unwrap().is_empty());
    }

    #[test]
    fn tampered_metadata_is_rejected() {
        let encoded = encode(b"payload", 3);
        let mut metadata = encoded.metadata.clone();
        metadata.size += 1;
        assert!(metadata.verify().is_err());

        let mut metadata = encoded.metadata.clone();
        metadata.sliver_digests[0] = B256::ZERO;
        assert_eq!(
            metadata.verify(),
            Err(EncodingError::MetadataMismatch(encoded.blob_id()))
        );
    }
}
