// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Wallet keys and signing.
//!
//! A [`Wallet`] signs both ledger transactions (through alloy's
//! `EthereumWallet`) and the personal messages behind session capabilities.
//! Keys are loaded from PEM (SEC1 or PKCS#8) or raw hex.

use alloy::{
    network::EthereumWallet,
    primitives::{Address, Signature},
    signers::{local::PrivateKeySigner, Signer},
};
use k256::SecretKey;
use ring::rand::{SecureRandom, SystemRandom};

/// Errors raised while loading keys or signing.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("Invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("Signing rejected: {0}")]
    Rejected(String),

    #[error("Randomness unavailable")]
    Randomness,
}

/// Parse a secp256k1 secret key from PEM (SEC1 or PKCS#8).
pub fn secret_key_from_pem(pem_bytes: &[u8]) -> Result<SecretKey, SigningError> {
    let pem_str = std::str::from_utf8(pem_bytes)
        .map_err(|e| SigningError::InvalidPrivateKey(format!("Invalid UTF-8: {}", e)))?;

    let pem = pem::parse(pem_str)
        .map_err(|e| SigningError::InvalidPrivateKey(format!("Invalid PEM: {}", e)))?;

    SecretKey::from_sec1_der(pem.contents())
        .or_else(|_| {
            use k256::pkcs8::DecodePrivateKey;
            SecretKey::from_pkcs8_der(pem.contents())
        })
        .map_err(|e| SigningError::InvalidPrivateKey(format!("Invalid key format: {}", e)))
}

/// Generate a fresh secp256k1 secret key from the system RNG.
pub fn random_secret_key() -> Result<SecretKey, SigningError> {
    let rng = SystemRandom::new();
    // Out-of-range scalars are astronomically rare; retry rather than reduce.
    for _ in 0..8 {
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes).map_err(|_| SigningError::Randomness)?;
        if let Ok(key) = SecretKey::from_slice(&bytes) {
            return Ok(key);
        }
    }
    Err(SigningError::Randomness)
}

/// A participant's signing wallet.
#[derive(Clone)]
pub struct Wallet {
    signer: PrivateKeySigner,
}

impl Wallet {
    /// Wrap an existing alloy signer.
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    /// Create a wallet with a freshly generated key.
    pub fn random() -> Result<Self, SigningError> {
        let key = random_secret_key()?;
        Self::from_secret_key(&key)
    }

    /// Create a wallet from a hex-encoded private key (with or without `0x`).
    pub fn from_hex(private_key_hex: &str) -> Result<Self, SigningError> {
        let key_bytes = alloy::hex::decode(private_key_hex.trim())
            .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))?;

        PrivateKeySigner::from_slice(&key_bytes)
            .map(Self::new)
            .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))
    }

    /// Create a wallet from a PEM-encoded private key.
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self, SigningError> {
        let key = secret_key_from_pem(pem_bytes)?;
        Self::from_secret_key(&key)
    }

    fn from_secret_key(key: &SecretKey) -> Result<Self, SigningError> {
        PrivateKeySigner::from_slice(&key.to_bytes())
            .map(Self::new)
            .map_err(|e| SigningError::InvalidPrivateKey(e.to_string()))
    }

    /// The wallet's address (participant identity).
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Transaction-signing wallet for alloy providers.
    pub fn ethereum_wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }

    /// Sign an EIP-191 personal message.
    pub async fn sign_message(&self, message: &[u8]) -> Result<Signature, SigningError> {
        self.signer
            .sign_message(message)
            .await
            .map_err(|e| SigningError::Rejected(e.to_string()))
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}
