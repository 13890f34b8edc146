// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Ledger integration for the GigNova marketplace contract.
//!
//! This module provides:
//! - The [`Ledger`] seam: submit, wait for finality, read objects
//! - [`EvmLedger`]: alloy-backed client for EVM chains
//! - [`InMemoryLedger`]: contract emulation for tests and local development
//! - [`Wallet`]: transaction and personal-message signing

pub mod contract;
pub mod evm;
pub mod memory;
pub mod signing;
pub mod types;

use async_trait::async_trait;

use crate::models::TxDigest;

pub use evm::{EvmLedger, EvmLedgerConfig};
pub use memory::{InMemoryLedger, ReplicaLedger};
pub use signing::{SigningError, Wallet};
pub use types::*;

/// Transaction client for the marketplace contract.
///
/// Implementations must be safe to share between concurrent submissions.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Sign and submit a call. Returns once the transaction is accepted,
    /// not once it is final.
    async fn submit(&self, call: &LedgerCall, wallet: &Wallet) -> LedgerResult<TxDigest>;

    /// Wait until the transaction is final and return its effects.
    async fn wait_for_finality(&self, digest: TxDigest) -> LedgerResult<TxEffects>;

    /// Effects of a transaction as currently visible to this endpoint, or
    /// `None` if it has not been observed yet.
    async fn effects(&self, digest: TxDigest) -> LedgerResult<Option<TxEffects>>;

    /// Current state of an on-chain object.
    async fn read_object(&self, object: ObjectRef) -> LedgerResult<Option<LedgerObject>>;

    /// Current storage epoch.
    async fn current_epoch(&self) -> LedgerResult<u32>;
}

/// Submit a call and wait for its effects.
pub async fn execute(
    ledger: &dyn Ledger,
    call: &LedgerCall,
    wallet: &Wallet,
) -> LedgerResult<TxEffects> {
    let kind = call.kind();
    let digest = ledger.submit(call, wallet).await?;
    tracing::debug!(call = %kind, digest = %digest, "Transaction submitted");

    let effects = ledger.wait_for_finality(digest).await?;
    tracing::info!(
        call = %kind,
        digest = %digest,
        block = effects.block_number,
        events = effects.events.len(),
        "Transaction final"
    );
    Ok(effects)
}
