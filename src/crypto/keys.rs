// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Key agreement and derivation for share masking and the body key.

use hmac::{Hmac, Mac};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, Scalar, SecretKey};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const SHARE_MASK_DOMAIN: &[u8] = b"gignova/share-mask/v1";
const DATA_KEY_DOMAIN: &[u8] = b"gignova/data-key/v1";

/// Length of a compressed SEC1 public key.
pub const PUBLIC_KEY_LEN: usize = 33;

/// Errors raised while handling key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Key derivation failed: {0}")]
    Derivation(String),
}

/// Compressed SEC1 encoding of a public key.
pub fn encode_public_key(key: &PublicKey) -> Vec<u8> {
    key.to_encoded_point(true).as_bytes().to_vec()
}

pub fn decode_public_key(bytes: &[u8]) -> Result<PublicKey, KeyError> {
    PublicKey::from_sec1_bytes(bytes).map_err(|e| KeyError::InvalidPublicKey(e.to_string()))
}

/// Mask for the share with `index` under encryption identity `id`.
///
/// Both sides compute the same value: the encryptor from its ephemeral
/// secret and the server's public key, the key server from its secret and
/// the ephemeral public key.
pub fn share_mask(
    secret: &SecretKey,
    peer: &PublicKey,
    id: &[u8],
    index: u8,
) -> Result<[u8; 32], KeyError> {
    let shared = k256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), peer.as_affine());

    let mut mac = HmacSha256::new_from_slice(shared.raw_secret_bytes())
        .map_err(|e| KeyError::Derivation(e.to_string()))?;
    mac.update(SHARE_MASK_DOMAIN);
    mac.update(&(id.len() as u32).to_be_bytes());
    mac.update(id);
    mac.update(&[index]);
    Ok(mac.finalize().into_bytes().into())
}

/// AEAD key derived from the shared secret scalar.
pub fn data_key(secret: &Scalar) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(DATA_KEY_DOMAIN);
    hasher.update(secret.to_bytes());
    hasher.finalize().into()
}

pub fn xor32(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (o, (x, y)) in out.iter_mut().zip(a.iter().zip(b.iter())) {
        *o = x ^ y;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::signing::random_secret_key;

    #[test]
    fn mask_agrees_on_both_sides() {
        let server = random_secret_key().unwrap();
        let ephemeral = random_secret_key().unwrap();
        let id = b"policy-and-nonce";

        let sender_side = share_mask(&ephemeral, &server.public_key(), id, 1).unwrap();
        let server_side = share_mask(&server, &ephemeral.public_key(), id, 1).unwrap();
        assert_eq!(sender_side, server_side);

        let other_index = share_mask(&server, &ephemeral.public_key(), id, 2).unwrap();
        assert_ne!(sender_side, other_index);
        let other_id = share_mask(&server, &ephemeral.public_key(), b"other", 1).unwrap();
        assert_ne!(sender_side, other_id);
    }

    #[test]
    fn public_key_encoding() {
        let key = random_secret_key().unwrap().public_key();
        let bytes = encode_public_key(&key);
        assert_eq!(bytes.len(), PUBLIC_KEY_LEN);
        assert_eq!(decode_public_key(&bytes).unwrap(), key);
        assert!(decode_public_key(&[2u8; 5]).is_err());
    }

    #[test]
    fn xor_is_an_involution() {
        let a = [0x5a; 32];
        let b = [0x0f; 32];
        assert_eq!(xor32(&xor32(&a, &b), &b), a);
    }
}
