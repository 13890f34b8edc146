// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Identity-bound content encryption.
//!
//! Content is sealed under an identity made of the access-policy id bytes
//! followed by the nonce bytes. The body key is derived from a random
//! scalar that is Shamir-split across the configured key servers; each
//! share is masked so that only the matching key server can release it,
//! and only to members of the policy.
//!
//! ## Modules
//!
//! - [`envelope`]: ciphertext container format
//! - [`shamir`]: secret sharing over secp256k1 scalars
//! - [`keys`]: ECDH share masks and data key derivation
//! - [`key_server`]: key server trait, local server, HTTP client
//! - [`registry`]: decryptor construction and LRU cache

pub mod envelope;
pub mod key_server;
pub mod keys;
pub mod registry;
pub mod shamir;

use alloy::primitives::Bytes;
use ring::aead::{Aad, LessSafeKey, Nonce as AeadNonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

use crate::ledger::signing::random_secret_key;
use crate::models::{Nonce, PolicyId};
use envelope::{Envelope, EnvelopeError, EnvelopeHeader, ServiceEntry, BODY_NONCE_LEN};
use key_server::KeyServerInfo;
use keys::{data_key, decode_public_key, encode_public_key, share_mask, xor32, KeyError};
use shamir::ShamirError;

pub use key_server::{
    FetchKeyRequest, FetchKeyResponse, HttpKeyServer, KeyServer, KeyServerError, LocalKeyServer,
};
pub use registry::{Decryptor, DecryptorCache, HttpConnector, KeyServerConnector, StaticConnector};

/// Errors raised while encrypting.
#[derive(Debug, thiserror::Error)]
pub enum EncryptError {
    #[error("No key servers configured")]
    NoKeyServers,

    #[error("Secret sharing failed: {0}")]
    Sharing(#[from] ShamirError),

    #[error("Invalid key material: {0}")]
    Key(#[from] KeyError),

    #[error("Randomness unavailable")]
    Randomness,

    #[error("Sealing failed")]
    Seal,

    #[error("Container encoding failed: {0}")]
    Envelope(#[from] EnvelopeError),
}

/// Errors raised while decrypting a parsed container.
#[derive(Debug, thiserror::Error)]
pub enum DecryptError {
    #[error("Session capability expired")]
    SessionExpired,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Key servers unavailable: {0}")]
    Unavailable(String),

    #[error("Ciphertext corrupted: {0}")]
    Corrupted(String),
}

/// Encryption identity: policy id bytes followed by nonce bytes.
pub fn identity(policy_id: &PolicyId, nonce: &Nonce) -> Vec<u8> {
    let mut id = Vec::with_capacity(32 + nonce.as_bytes().len());
    id.extend_from_slice(policy_id.as_bytes());
    id.extend_from_slice(nonce.as_bytes());
    id
}

fn aead_key(key: &[u8; 32]) -> Option<LessSafeKey> {
    UnboundKey::new(&AES_256_GCM, key)
        .ok()
        .map(LessSafeKey::new)
}

fn seal_body(
    key: &[u8; 32],
    nonce: [u8; BODY_NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, EncryptError> {
    let key = aead_key(key).ok_or(EncryptError::Seal)?;
    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(
        AeadNonce::assume_unique_for_key(nonce),
        Aad::from(aad),
        &mut in_out,
    )
    .map_err(|_| EncryptError::Seal)?;
    Ok(in_out)
}

pub(crate) fn open_body(
    key: &[u8; 32],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, DecryptError> {
    let key = aead_key(key).ok_or_else(|| DecryptError::Corrupted("invalid body key".into()))?;
    let nonce = AeadNonce::try_assume_unique_for_key(nonce)
        .map_err(|_| DecryptError::Corrupted("body nonce length".into()))?;

    let mut in_out = ciphertext.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| DecryptError::Corrupted("body authentication failed".into()))?;
    let len = plaintext.len();
    in_out.truncate(len);
    Ok(in_out)
}

/// Seals content for a fixed key-server set.
pub struct EncryptionClient {
    servers: Vec<KeyServerInfo>,
    threshold: u8,
    rng: SystemRandom,
}

impl EncryptionClient {
    pub fn new(servers: Vec<KeyServerInfo>, threshold: u8) -> Result<Self, EncryptError> {
        if servers.is_empty() {
            return Err(EncryptError::NoKeyServers);
        }
        let count = u8::try_from(servers.len()).map_err(|_| ShamirError::InvalidThreshold {
            threshold,
            count: u8::MAX,
        })?;
        if threshold == 0 || threshold > count {
            return Err(ShamirError::InvalidThreshold { threshold, count }.into());
        }
        for server in &servers {
            decode_public_key(&server.public_key)?;
        }
        Ok(Self {
            servers,
            threshold,
            rng: SystemRandom::new(),
        })
    }

    pub fn servers(&self) -> &[KeyServerInfo] {
        &self.servers
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Seal `plaintext` under `policy_id ‖ nonce` and return the container
    /// bytes.
    pub fn encrypt(
        &self,
        policy_id: &PolicyId,
        nonce: &Nonce,
        plaintext: &[u8],
    ) -> Result<Vec<u8>, EncryptError> {
        let id = identity(policy_id, nonce);
        let count = self.servers.len() as u8;

        let secret = shamir::random_scalar(&self.rng)?;
        let shares = shamir::split(&secret, self.threshold, count, &self.rng)?;

        let mut services = Vec::with_capacity(self.servers.len());
        for (server, share) in self.servers.iter().zip(&shares) {
            let server_key = decode_public_key(&server.public_key)?;
            let ephemeral = random_secret_key().map_err(|_| EncryptError::Randomness)?;
            let mask = share_mask(&ephemeral, &server_key, &id, share.index)?;
            services.push(ServiceEntry {
                object_id: server.object_id,
                url: server.url.clone(),
                index: share.index,
                ephemeral_key: Bytes::from(encode_public_key(&ephemeral.public_key())),
                sealed_share: Bytes::from(xor32(&share.to_bytes(), &mask).to_vec()),
            });
        }

        let mut body_nonce = [0u8; BODY_NONCE_LEN];
        self.rng
            .fill(&mut body_nonce)
            .map_err(|_| EncryptError::Randomness)?;
        let body = seal_body(&data_key(&secret), body_nonce, &id, plaintext)?;

        let envelope = Envelope {
            header: EnvelopeHeader {
                id: Bytes::from(id),
                threshold: self.threshold,
                services,
                body_nonce: Bytes::from(body_nonce.to_vec()),
            },
            body,
        };

        tracing::debug!(
            policy_id = %policy_id,
            plaintext_len = plaintext.len(),
            key_servers = count,
            threshold = self.threshold,
            "Content sealed"
        );
        Ok(envelope.to_bytes()?)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::test_support::local_key_servers;
    use super::*;
    use crate::ledger::{execute, InMemoryLedger, LedgerCall, Wallet};
    use crate::session::SessionCapability;

    async fn policy_for(ledger: &InMemoryLedger, owner: &Wallet) -> PolicyId {
        execute(ledger, &LedgerCall::CreatePolicy, owner)
            .await
            .unwrap()
            .created_policy()
            .unwrap()
    }

    #[tokio::test]
    async fn member_decrypts_any_bytes() {
        let ledger = InMemoryLedger::new();
        let owner = Wallet::random().unwrap();
        let policy_id = policy_for(&ledger, &owner).await;
        let (infos, servers, connector) = local_key_servers(Arc::new(ledger.clone()), 3);

        let client = EncryptionClient::new(infos, 2).unwrap();
        let cache = DecryptorCache::new(Arc::new(connector), 4);
        let cap = SessionCapability::request(&owner, Utc::now())
            .await
            .unwrap();

        let samples = [
            Vec::new(),
            vec![0u8],
            b"final deliverable".to_vec(),
            vec![0xff; 70_000],
        ];
        for plaintext in samples {
            let nonce = Nonce::generate();
            let sealed = client.encrypt(&policy_id, &nonce, &plaintext).unwrap();
            let envelope = Envelope::parse(&sealed).unwrap();
            assert_eq!(
                envelope.header.id.as_ref(),
                identity(&policy_id, &nonce).as_slice()
            );

            let decryptor = cache.decryptor_for(&envelope.header.services).unwrap();
            assert_eq!(decryptor.decrypt(&envelope, &cap).await.unwrap(), plaintext);
        }

        // Two of three servers are asked per decryption
        let calls: usize = servers.iter().map(|s| s.calls()).sum();
        assert_eq!(calls, 8);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn non_member_is_denied() {
        let ledger = InMemoryLedger::new();
        let owner = Wallet::random().unwrap();
        let stranger = Wallet::random().unwrap();
        let policy_id = policy_for(&ledger, &owner).await;
        let (infos, _servers, connector) = local_key_servers(Arc::new(ledger.clone()), 2);

        let client = EncryptionClient::new(infos, 1).unwrap();
        let sealed = client
            .encrypt(&policy_id, &Nonce::generate(), b"secret")
            .unwrap();
        let envelope = Envelope::parse(&sealed).unwrap();

        let cache = DecryptorCache::new(Arc::new(connector), 4);
        let cap = SessionCapability::request(&stranger, Utc::now())
            .await
            .unwrap();
        let result = cache
            .decryptor_for(&envelope.header.services)
            .unwrap()
            .decrypt(&envelope, &cap)
            .await;
        assert!(matches!(result, Err(DecryptError::AccessDenied(_))));
    }

    #[tokio::test]
    async fn tampered_identity_fails_authentication() {
        let ledger = InMemoryLedger::new();
        let owner = Wallet::random().unwrap();
        let policy_id = policy_for(&ledger, &owner).await;
        let (infos, _servers, connector) = local_key_servers(Arc::new(ledger.clone()), 1);

        let client = EncryptionClient::new(infos, 1).unwrap();
        let sealed = client
            .encrypt(&policy_id, &Nonce::from("nonce-a"), b"secret")
            .unwrap();
        let mut envelope = Envelope::parse(&sealed).unwrap();
        // Same policy, different nonce: the server releases a mask for the
        // wrong identity and the share no longer matches
        envelope.header.id = Bytes::from(identity(&policy_id, &Nonce::from("nonce-b")));

        let cache = DecryptorCache::new(Arc::new(connector), 4);
        let cap = SessionCapability::request(&owner, Utc::now())
            .await
            .unwrap();
        let result = cache
            .decryptor_for(&envelope.header.services)
            .unwrap()
            .decrypt(&envelope, &cap)
            .await;
        assert!(matches!(result, Err(DecryptError::Corrupted(_))));
    }

    #[test]
    fn client_validates_configuration() {
        assert!(matches!(
            EncryptionClient::new(Vec::new(), 1),
            Err(EncryptError::NoKeyServers)
        ));

        let info = KeyServerInfo {
            object_id: alloy::primitives::B256::ZERO,
            url: "http://ks".to_string(),
            public_key: Bytes::from(encode_public_key(
                &random_secret_key().unwrap().public_key(),
            )),
        };
        assert!(matches!(
            EncryptionClient::new(vec![info.clone()], 2),
            Err(EncryptError::Sharing(_))
        ));

        let mut bad = info;
        bad.public_key = Bytes::from(vec![1u8; 3]);
        assert!(matches!(
            EncryptionClient::new(vec![bad], 1),
            Err(EncryptError::Key(_))
        ));
    }
}
