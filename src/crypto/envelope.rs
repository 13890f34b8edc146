// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Ciphertext container.
//!
//! ```text
//! "GNSE" | version u8 | header_len u32 BE | header JSON
//!        | body_len u64 BE | body | SHA-256 of everything before
//! ```
//!
//! Parsing validates structure, lengths, checksum and header fields before
//! any key material is requested, so a corrupted container is rejected
//! without contacting a key server.

use alloy::primitives::{Bytes, B256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::keys::PUBLIC_KEY_LEN;

pub const MAGIC: &[u8; 4] = b"GNSE";
pub const VERSION: u8 = 1;

/// AES-GCM nonce length.
pub const BODY_NONCE_LEN: usize = 12;

const CHECKSUM_LEN: usize = 32;
const MAX_HEADER_LEN: usize = 64 * 1024;

/// Structural errors in a ciphertext container.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("Container truncated")]
    Truncated,

    #[error("Not a GigNova container")]
    BadMagic,

    #[error("Unsupported container version {0}")]
    UnsupportedVersion(u8),

    #[error("Container length mismatch")]
    LengthMismatch,

    #[error("Container checksum mismatch")]
    ChecksumMismatch,

    #[error("Invalid container header: {0}")]
    InvalidHeader(String),
}

/// Key-server entry recorded in the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Key server identifier.
    pub object_id: B256,
    /// Key server base URL.
    pub url: String,
    /// Share index held by this server.
    pub index: u8,
    /// Ephemeral public key (compressed SEC1) used for this server.
    pub ephemeral_key: Bytes,
    /// Share masked with the server-derived key.
    pub sealed_share: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeHeader {
    /// Encryption identity (policy id bytes followed by nonce bytes).
    pub id: Bytes,
    pub threshold: u8,
    pub services: Vec<ServiceEntry>,
    pub body_nonce: Bytes,
}

impl EnvelopeHeader {
    fn validate(&self) -> Result<(), EnvelopeError> {
        let invalid = |msg: &str| Err(EnvelopeError::InvalidHeader(msg.to_string()));

        if self.id.is_empty() {
            return invalid("empty identity");
        }
        if self.threshold == 0 || self.threshold as usize > self.services.len() {
            return invalid("threshold out of range");
        }
        if self.body_nonce.len() != BODY_NONCE_LEN {
            return invalid("body nonce length");
        }
        for (i, service) in self.services.iter().enumerate() {
            if service.ephemeral_key.len() != PUBLIC_KEY_LEN {
                return invalid("ephemeral key length");
            }
            if service.sealed_share.len() != 32 {
                return invalid("sealed share length");
            }
            if self.services[..i].iter().any(|s| s.index == service.index) {
                return invalid("duplicate share index");
            }
        }
        Ok(())
    }
}

/// Parsed ciphertext container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    /// AES-256-GCM ciphertext with appended tag.
    pub body: Vec<u8>,
}

impl Envelope {
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        let header = serde_json::to_vec(&self.header)
            .map_err(|e| EnvelopeError::InvalidHeader(e.to_string()))?;
        let header_len = u32::try_from(header.len()).map_err(|_| EnvelopeError::LengthMismatch)?;

        let mut out =
            Vec::with_capacity(4 + 1 + 4 + header.len() + 8 + self.body.len() + CHECKSUM_LEN);
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&header_len.to_be_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&(self.body.len() as u64).to_be_bytes());
        out.extend_from_slice(&self.body);
        let checksum = Sha256::digest(&out);
        out.extend_from_slice(&checksum);
        Ok(out)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let mut cursor = Cursor::new(bytes);

        if cursor.take(4)? != MAGIC {
            return Err(EnvelopeError::BadMagic);
        }
        let version = cursor.take(1)?[0];
        if version != VERSION {
            return Err(EnvelopeError::UnsupportedVersion(version));
        }

        let header_len = u32::from_be_bytes(cursor.array()?) as usize;
        if header_len > MAX_HEADER_LEN {
            return Err(EnvelopeError::LengthMismatch);
        }
        let header_bytes = cursor.take(header_len)?;
        let body_len = usize::try_from(u64::from_be_bytes(cursor.array()?))
            .map_err(|_| EnvelopeError::LengthMismatch)?;
        let body = cursor.take(body_len)?;

        let signed_len = cursor.position();
        let checksum = cursor.take(CHECKSUM_LEN)?;
        if !cursor.is_empty() {
            return Err(EnvelopeError::LengthMismatch);
        }
        if Sha256::digest(&bytes[..signed_len]).as_slice() != checksum {
            return Err(EnvelopeError::ChecksumMismatch);
        }

        let header: EnvelopeHeader = serde_json::from_slice(header_bytes)
            .map_err(|e| EnvelopeError::InvalidHeader(e.to_string()))?;
        header.validate()?;

        Ok(Self {
            header,
            body: body.to_vec(),
        })
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], EnvelopeError> {
        let end = self.pos.checked_add(len).ok_or(EnvelopeError::Truncated)?;
        let slice = self
            .bytes
            .get(self.pos..end)
            .ok_or(EnvelopeError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], EnvelopeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn is_empty(&self) -> bool {
        self.pos == self.bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            header: EnvelopeHeader {
                id: Bytes::from(vec![7u8; 40]),
                threshold: 1,
                services: vec![ServiceEntry {
                    object_id: B256::repeat_byte(1),
                    url: "http://127.0.0.1:9000/key-servers/0".to_string(),
                    index: 0,
                    ephemeral_key: Bytes::from(vec![2u8; PUBLIC_KEY_LEN]),
                    sealed_share: Bytes::from(vec![3u8; 32]),
                }],
                body_nonce: Bytes::from(vec![4u8; BODY_NONCE_LEN]),
            },
            body: b"ciphertext".to_vec(),
        }
    }

    #[test]
    fn serialized_container_parses() {
        let envelope = sample();
        let bytes = envelope.to_bytes().unwrap();
        assert_eq!(&bytes[..4], MAGIC);
        assert_eq!(Envelope::parse(&bytes).unwrap(), envelope);
    }

    #[test]
    fn every_flipped_byte_is_rejected() {
        let bytes = sample().to_bytes().unwrap();
        for i in 0..bytes.len() {
            let mut corrupted = bytes.clone();
            corrupted[i] ^= 0x01;
            assert!(Envelope::parse(&corrupted).is_err(), "byte {i} accepted");
        }
    }

    #[test]
    fn structural_errors_are_specific() {
        let bytes = sample().to_bytes().unwrap();

        assert_eq!(Envelope::parse(&bytes[..3]), Err(EnvelopeError::Truncated));
        assert_eq!(
            Envelope::parse(&bytes[..bytes.len() - 1]),
            Err(EnvelopeError::Truncated)
        );

        let mut extended = bytes.clone();
        extended.push(0);
        assert_eq!(
            Envelope::parse(&extended),
            Err(EnvelopeError::LengthMismatch)
        );

        let mut wrong_magic = bytes.clone();
        wrong_magic[0] = b'X';
        assert_eq!(Envelope::parse(&wrong_magic), Err(EnvelopeError::BadMagic));

        let mut wrong_version = bytes.clone();
        wrong_version[4] = 9;
        assert_eq!(
            Envelope::parse(&wrong_version),
            Err(EnvelopeError::UnsupportedVersion(9))
        );

        let last = bytes.len() - 1;
        let mut bad_sum = bytes;
        bad_sum[last] ^= 0xff;
        assert_eq!(
            Envelope::parse(&bad_sum),
            Err(EnvelopeError::ChecksumMismatch)
        );
    }

    #[test]
    fn header_fields_are_validated() {
        let mut envelope = sample();
        envelope.header.threshold = 2;
        let bytes = envelope.to_bytes().unwrap();
        assert!(matches!(
            Envelope::parse(&bytes),
            Err(EnvelopeError::InvalidHeader(_))
        ));

        let mut envelope = sample();
        envelope.header.body_nonce = Bytes::from(vec![0u8; 4]);
        let bytes = envelope.to_bytes().unwrap();
        assert!(matches!(
            Envelope::parse(&bytes),
            Err(EnvelopeError::InvalidHeader(_))
        ));
    }

    #[test]
    fn empty_body_is_allowed() {
        let mut envelope = sample();
        envelope.body.clear();
        let bytes = envelope.to_bytes().unwrap();
        assert!(Envelope::parse(&bytes).unwrap().body.is_empty());
    }
}
