// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! # Blob Expiry Sweeper
//!
//! Background task of the development network that drops blobs from the
//! storage nodes once their storage period has ended.
//!
//! Every `interval` (default 60 s) the sweeper reads each stored blob's
//! registration object from the ledger and removes the blob from its node
//! when the current epoch has reached the blob's end epoch, or when the
//! registration no longer exists. Ledger errors skip the sweep.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken`.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ledger::{LedgerObject, ObjectRef};
use crate::state::DevnetState;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct ExpirySweeper {
    state: DevnetState,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(state: DevnetState) -> Self {
        Self {
            state,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until `shutdown` is cancelled.
    ///
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Blob expiry sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Blob expiry sweeper shutting down");
                    return;
                }
            }
            self.sweep().await;
        }
    }

    /// One sweep over every node. Returns the number of blobs removed.
    pub async fn sweep(&self) -> usize {
        let epoch = match self.state.ledger.current_epoch().await {
            Ok(epoch) => epoch,
            Err(e) => {
                warn!(error = %e, "Expiry sweep skipped, ledger unavailable");
                return 0;
            }
        };

        let mut removed = 0;
        for (index, node) in self.state.nodes.iter().enumerate() {
            let registrations = node.read().await.registrations();
            for (blob_id, object_id) in registrations {
                let expired = match self
                    .state
                    .ledger
                    .read_object(ObjectRef::Blob(object_id))
                    .await
                {
                    Ok(Some(LedgerObject::Blob(blob))) => epoch >= blob.end_epoch,
                    Ok(_) => true,
                    Err(e) => {
                        debug!(blob_id = %blob_id, error = %e, "Could not read blob object");
                        false
                    }
                };
                if expired && node.write().await.remove(&blob_id) {
                    info!(node = index, blob_id = %blob_id, epoch, "Expired blob removed");
                    removed += 1;
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::ledger::{execute, InMemoryLedger, LedgerCall, Wallet};
    use crate::storage::encode;

    #[tokio::test]
    async fn expired_blobs_are_removed() {
        let ledger = InMemoryLedger::new();
        let state = DevnetState::new(Arc::new(ledger.clone()), 2, Vec::new());
        let wallet = Wallet::random().unwrap();

        let encoded = encode(b"short lived", 2);
        let effects = execute(
            &ledger,
            &LedgerCall::RegisterBlob {
                blob_id: encoded.blob_id(),
                size: encoded.metadata.size,
                epochs: 2,
            },
            &wallet,
        )
        .await
        .unwrap();
        let (object_id, _) = effects.registered_blob(&encoded.blob_id()).unwrap();
        for node in state.nodes.iter() {
            node.write()
                .await
                .put_metadata(encoded.metadata.clone(), object_id);
        }

        let sweeper = ExpirySweeper::new(state.clone());
        assert_eq!(sweeper.sweep().await, 0);

        ledger.advance_epoch(2);
        assert_eq!(sweeper.sweep().await, 2);
        assert!(state.nodes[0].read().await.is_empty());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let state = DevnetState::new(Arc::new(InMemoryLedger::new()), 1, Vec::new());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(
            ExpirySweeper::new(state)
                .with_interval(Duration::from_millis(10))
                .run(shutdown.clone()),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.cancel();
        handle.await.unwrap();
    }
}
