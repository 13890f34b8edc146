// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! EVM ledger client for the GigNova marketplace contract.
//!
//! Transactions are built as plain contract calls and signed by the caller's
//! [`Wallet`]. Finality means: receipt present, status successful, and
//! buried under `confirmations` blocks, all within `finality_timeout`.

use std::future::IntoFuture;
use std::time::Duration;

use alloy::{
    primitives::{Address, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
};
use async_trait::async_trait;
use tokio::time::timeout;

use super::contract::{decode_event, encode_call, IGigNova};
use super::types::*;
use super::{Ledger, Wallet};
use crate::models::{BlobId, MilestoneRecord, MilestoneState, ObjectId, TxDigest};

/// Connection settings for [`EvmLedger`].
#[derive(Debug, Clone)]
pub struct EvmLedgerConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: url::Url,
    /// Marketplace contract address.
    pub contract: Address,
    /// Expected chain id; verified on connect when set.
    pub chain_id: Option<u64>,
    /// Blocks a receipt must be buried under to count as final.
    pub confirmations: u64,
    /// Upper bound on waiting for finality.
    pub finality_timeout: Duration,
    /// Delay between receipt polls.
    pub poll_interval: Duration,
    /// Timeout applied to each RPC request.
    pub rpc_timeout: Duration,
}

impl EvmLedgerConfig {
    pub fn new(rpc_url: url::Url, contract: Address) -> Self {
        Self {
            rpc_url,
            contract,
            chain_id: None,
            confirmations: 1,
            finality_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

/// Ledger backed by an EVM JSON-RPC endpoint.
#[derive(Clone)]
pub struct EvmLedger {
    provider: DynProvider,
    config: EvmLedgerConfig,
}

impl EvmLedger {
    /// Create a client and verify the chain id when one is configured.
    pub async fn connect(config: EvmLedgerConfig) -> LedgerResult<Self> {
        let provider = ProviderBuilder::new()
            .connect_http(config.rpc_url.clone())
            .erased();
        let ledger = Self { provider, config };

        if let Some(expected) = ledger.config.chain_id {
            let actual = ledger.rpc(ledger.provider.get_chain_id()).await?;
            if actual != expected {
                return Err(LedgerError::Config(format!(
                    "chain id mismatch: expected {expected}, got {actual}"
                )));
            }
        }

        tracing::info!(
            rpc_url = %ledger.config.rpc_url,
            contract = %ledger.config.contract,
            confirmations = ledger.config.confirmations,
            "EVM ledger connected"
        );
        Ok(ledger)
    }

    pub fn config(&self) -> &EvmLedgerConfig {
        &self.config
    }

    fn contract(&self) -> IGigNova::IGigNovaInstance<DynProvider> {
        IGigNova::new(self.config.contract, self.provider.clone())
    }

    /// Apply the per-request timeout and map transport errors.
    async fn rpc<T, E: std::fmt::Display>(
        &self,
        fut: impl IntoFuture<Output = Result<T, E>>,
    ) -> LedgerResult<T> {
        match timeout(self.config.rpc_timeout, fut.into_future()).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(LedgerError::Rpc(e.to_string())),
            Err(_) => Err(LedgerError::Rpc(format!(
                "request timed out after {} seconds",
                self.config.rpc_timeout.as_secs()
            ))),
        }
    }

    fn effects_from_receipt(&self, receipt: &TransactionReceipt) -> TxEffects {
        TxEffects {
            digest: receipt.transaction_hash,
            sender: receipt.from,
            block_number: receipt.block_number.unwrap_or_default(),
            events: receipt
                .inner
                .logs()
                .iter()
                .filter_map(|log| decode_event(self.config.contract, log))
                .collect(),
        }
    }

    /// Effects if the receipt exists and has enough confirmations.
    async fn final_effects(&self, digest: TxDigest) -> LedgerResult<Option<TxEffects>> {
        let Some(receipt) = self
            .rpc(self.provider.get_transaction_receipt(digest))
            .await?
        else {
            return Ok(None);
        };

        if !receipt.status() {
            return Err(LedgerError::Reverted {
                digest,
                reason: "execution reverted".to_string(),
            });
        }

        let included = receipt.block_number.unwrap_or_default();
        let head = self.rpc(self.provider.get_block_number()).await?;
        if head.saturating_add(1) < included.saturating_add(self.config.confirmations) {
            return Ok(None);
        }
        Ok(Some(self.effects_from_receipt(&receipt)))
    }
}

#[async_trait]
impl Ledger for EvmLedger {
    async fn submit(&self, call: &LedgerCall, wallet: &Wallet) -> LedgerResult<TxDigest> {
        let provider = ProviderBuilder::new()
            .wallet(wallet.ethereum_wallet())
            .connect_http(self.config.rpc_url.clone());

        let mut tx = TransactionRequest::default()
            .from(wallet.address())
            .to(self.config.contract)
            .input(encode_call(call).into());

        if let LedgerCall::PostJob {
            milestone_amounts, ..
        } = call
        {
            let escrow = milestone_amounts
                .iter()
                .fold(U256::ZERO, |acc, amount| acc.saturating_add(*amount));
            tx = tx.value(escrow);
        }

        let pending = provider
            .send_transaction(tx)
            .await
            .map_err(|e| LedgerError::Submission(format!("Failed to send: {}", e)))?;

        Ok(*pending.tx_hash())
    }

    async fn wait_for_finality(&self, digest: TxDigest) -> LedgerResult<TxEffects> {
        let poll = async {
            loop {
                if let Some(effects) = self.final_effects(digest).await? {
                    return Ok(effects);
                }
                tokio::time::sleep(self.config.poll_interval).await;
            }
        };

        match timeout(self.config.finality_timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::FinalityTimeout {
                digest,
                waited_secs: self.config.finality_timeout.as_secs(),
            }),
        }
    }

    async fn effects(&self, digest: TxDigest) -> LedgerResult<Option<TxEffects>> {
        self.final_effects(digest).await
    }

    async fn read_object(&self, object: ObjectRef) -> LedgerResult<Option<LedgerObject>> {
        let contract = self.contract();
        match object {
            ObjectRef::Policy(id) => {
                let policy = self.rpc(contract.policy(id.0).call()).await?;
                Ok(policy.exists.then(|| {
                    LedgerObject::AccessPolicy(AccessPolicyState {
                        id,
                        owner: policy.owner,
                        members: policy.members,
                    })
                }))
            }
            ObjectRef::Blob(id) => {
                let blob = self.rpc(contract.blob(id.0).call()).await?;
                Ok(blob.exists.then(|| {
                    LedgerObject::Blob(BlobObject {
                        id: ObjectId(id.0),
                        blob_id: BlobId(blob.blobId),
                        owner: blob.owner,
                        size: blob.size,
                        registered_epoch: blob.registeredEpoch,
                        end_epoch: blob.endEpoch,
                        certified: blob.certified,
                    })
                }))
            }
            ObjectRef::Milestone { job_id, index } => {
                let m = self.rpc(contract.milestone(job_id, index).call()).await?;
                if !m.exists {
                    return Ok(None);
                }
                let state = MilestoneState::from_code(m.state).ok_or_else(|| {
                    LedgerError::Rpc(format!("unknown milestone state {}", m.state))
                })?;
                Ok(Some(LedgerObject::Milestone(MilestoneRecord {
                    job_id,
                    index,
                    state,
                    client: m.client,
                    freelancer: (m.freelancer != Address::ZERO).then_some(m.freelancer),
                    submission: m.hasDeliverable.then(|| m.deliverable.into()),
                })))
            }
        }
    }

    async fn current_epoch(&self) -> LedgerResult<u32> {
        self.rpc(self.contract().currentEpoch().call()).await
    }
}

impl std::fmt::Debug for EvmLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmLedger")
            .field("rpc_url", &self.config.rpc_url.as_str())
            .field("contract", &self.config.contract)
            .field("confirmations", &self.config.confirmations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PolicyId;
    use alloy::primitives::B256;

    fn test_config() -> EvmLedgerConfig {
        // Port 9 (discard) is never an RPC endpoint
        let mut config = EvmLedgerConfig::new(
            "http://127.0.0.1:9".parse().unwrap(),
            Address::repeat_byte(0xcc),
        );
        config.rpc_timeout = Duration::from_millis(500);
        config.finality_timeout = Duration::from_millis(300);
        config.poll_interval = Duration::from_millis(50);
        config
    }

    #[test]
    fn default_config_values() {
        let config = EvmLedgerConfig::new("http://localhost:8545".parse().unwrap(), Address::ZERO);
        assert_eq!(config.confirmations, 1);
        assert_eq!(config.finality_timeout, Duration::from_secs(60));
        assert!(config.chain_id.is_none());
    }

    #[tokio::test]
    async fn connect_without_chain_id_does_not_touch_rpc() {
        let ledger = EvmLedger::connect(test_config()).await;
        assert!(ledger.is_ok());
    }

    #[tokio::test]
    async fn unreachable_rpc_surfaces_errors() {
        let ledger = EvmLedger::connect(test_config()).await.unwrap();
        let epoch = ledger.current_epoch().await;
        assert!(matches!(epoch, Err(LedgerError::Rpc(_))));

        let policy = ledger
            .read_object(ObjectRef::Policy(PolicyId(B256::ZERO)))
            .await;
        assert!(matches!(policy, Err(LedgerError::Rpc(_))));

        let mut with_chain = test_config();
        with_chain.chain_id = Some(31337);
        assert!(EvmLedger::connect(with_chain).await.is_err());
    }
}
