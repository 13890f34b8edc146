// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Four-phase blob publishing: encode, register, upload, certify.
//!
//! Each phase completes before the next begins. Between register and
//! upload the configured [`PropagationPolicy`] gates the upload until the
//! storage nodes can see the registration. A failure after registration
//! carries a [`RegisteredBlob`] so the caller can resume from the upload
//! phase instead of registering again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use super::encoding::{encode, EncodedBlob};
use super::flow::{FlowEvent, UploadFlow};
use super::node::{RegistrationProof, StorageNodeClient, StorageNodeError};
use crate::ledger::{execute, Ledger, LedgerCall, LedgerError, Wallet};
use crate::models::{BlobId, ObjectId, TxDigest};

/// Default storage duration in epochs.
pub const DEFAULT_EPOCHS: u32 = 5;

/// Blind delay used by [`PropagationPolicy::fixed_default`].
pub const DEFAULT_FIXED_DELAY: Duration = Duration::from_secs(5);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(30);

/// How to wait for storage nodes to observe a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationPolicy {
    /// Sleep for a fixed duration.
    FixedDelay(Duration),
    /// Poll every node until each reports the registration visible.
    PollUntilVisible {
        interval: Duration,
        timeout: Duration,
    },
}

impl Default for PropagationPolicy {
    fn default() -> Self {
        PropagationPolicy::PollUntilVisible {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}

impl PropagationPolicy {
    pub fn fixed_default() -> Self {
        PropagationPolicy::FixedDelay(DEFAULT_FIXED_DELAY)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PublisherConfig {
    pub epochs: u32,
    pub propagation: PropagationPolicy,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            epochs: DEFAULT_EPOCHS,
            propagation: PropagationPolicy::default(),
        }
    }
}

/// A certified blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedBlob {
    pub blob_id: BlobId,
    pub object_id: ObjectId,
    pub end_epoch: u32,
    pub registration_digest: TxDigest,
    pub certification_digest: TxDigest,
}

/// Blob whose registration committed; enough to resume the upload.
#[derive(Debug, Clone)]
pub struct RegisteredBlob {
    pub encoded: EncodedBlob,
    pub object_id: ObjectId,
    pub end_epoch: u32,
    pub registration_digest: TxDigest,
}

impl RegisteredBlob {
    pub fn blob_id(&self) -> BlobId {
        self.encoded.blob_id()
    }

    fn proof(&self) -> RegistrationProof {
        RegistrationProof {
            digest: self.registration_digest,
            object_id: self.object_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishPhase {
    Encode,
    Register,
    Upload,
    Certify,
}

impl fmt::Display for PublishPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PublishPhase::Encode => "encode",
            PublishPhase::Register => "register",
            PublishPhase::Upload => "upload",
            PublishPhase::Certify => "certify",
        })
    }
}

/// Underlying cause of a publish failure.
#[derive(Debug, thiserror::Error)]
pub enum PublishFailure {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("No storage nodes configured")]
    NoNodes,

    #[error("Registration not visible to all storage nodes after {waited_ms} ms")]
    PropagationTimeout { waited_ms: u128 },

    #[error("Only {stored} of {required} required slivers stored")]
    InsufficientSlivers {
        stored: usize,
        required: usize,
        #[source]
        last_error: Option<StorageNodeError>,
    },
}

/// Where a failed publish can be retried from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPoint {
    /// Registration committed; call [`BlobPublisher::resume`].
    ResumeUpload,
    /// Nothing committed; publish again.
    Restart,
}

#[derive(Debug, thiserror::Error)]
#[error("Blob publish failed during {phase}: {source}")]
pub struct PublishError {
    pub phase: PublishPhase,
    pub source: PublishFailure,
    pub resume: Option<Box<RegisteredBlob>>,
}

impl PublishError {
    pub fn retry_point(&self) -> RetryPoint {
        if self.resume.is_some() {
            RetryPoint::ResumeUpload
        } else {
            RetryPoint::Restart
        }
    }

    /// Whether a storage node refused an upload because it could not see
    /// the registration.
    pub fn is_not_registered(&self) -> bool {
        matches!(
            &self.source,
            PublishFailure::InsufficientSlivers {
                last_error: Some(StorageNodeError::NotRegistered { .. }),
                ..
            }
        )
    }
}

/// Publishes blobs to the storage network.
#[derive(Clone)]
pub struct BlobPublisher {
    ledger: Arc<dyn Ledger>,
    nodes: Vec<StorageNodeClient>,
    config: PublisherConfig,
}

impl BlobPublisher {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        nodes: Vec<StorageNodeClient>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            ledger,
            nodes,
            config,
        }
    }

    pub fn config(&self) -> &PublisherConfig {
        &self.config
    }

    /// Publish `data` owned by `wallet`. Returns after certification.
    pub async fn publish(
        &self,
        data: &[u8],
        wallet: &Wallet,
    ) -> Result<PublishedBlob, PublishError> {
        let mut flow = UploadFlow::new();
        let fail = |flow: &mut UploadFlow, phase: PublishPhase, source: PublishFailure| {
            flow.record(FlowEvent::Failed(source.to_string()));
            PublishError {
                phase,
                source,
                resume: None,
            }
        };

        if self.nodes.is_empty() {
            let source = PublishFailure::NoNodes;
            return Err(fail(&mut flow, PublishPhase::Encode, source));
        }

        // Phase 1: encode
        let encoded = encode(data, self.nodes.len());
        let blob_id = encoded.blob_id();
        flow.set_blob_id(blob_id);
        flow.record(FlowEvent::Encoded);

        // Phase 2: register
        let call = LedgerCall::RegisterBlob {
            blob_id,
            size: encoded.metadata.size,
            epochs: self.config.epochs,
        };
        let effects = match execute(self.ledger.as_ref(), &call, wallet).await {
            Ok(effects) => effects,
            Err(e) => return Err(fail(&mut flow, PublishPhase::Register, e.into())),
        };
        let Some((object_id, end_epoch)) = effects.registered_blob(&blob_id) else {
            let missing = LedgerError::MissingEvent {
                digest: effects.digest,
                expected: "BlobRegistered",
            };
            return Err(fail(&mut flow, PublishPhase::Register, missing.into()));
        };
        flow.record(FlowEvent::Registered);

        tracing::info!(
            blob_id = %blob_id,
            object_id = %object_id,
            end_epoch,
            digest = %effects.digest,
            "Blob registered"
        );

        let registered = RegisteredBlob {
            encoded,
            object_id,
            end_epoch,
            registration_digest: effects.digest,
        };
        self.upload_and_certify(registered, wallet, flow).await
    }

    /// Retry a publish from the upload phase.
    pub async fn resume(
        &self,
        registered: RegisteredBlob,
        wallet: &Wallet,
    ) -> Result<PublishedBlob, PublishError> {
        tracing::info!(
            blob_id = %registered.blob_id(),
            object_id = %registered.object_id,
            "Resuming blob publish from upload"
        );
        let flow = UploadFlow::resumed(registered.blob_id());
        self.upload_and_certify(registered, wallet, flow).await
    }

    async fn upload_and_certify(
        &self,
        registered: RegisteredBlob,
        wallet: &Wallet,
        mut flow: UploadFlow,
    ) -> Result<PublishedBlob, PublishError> {
        // Phase 3: propagation gate, then upload
        let uploaded = match self.await_propagation(&registered).await {
            Ok(()) => self.upload(&registered).await,
            Err(e) => Err(e),
        };
        if let Err(source) = uploaded {
            flow.record(FlowEvent::Failed(source.to_string()));
            return Err(PublishError {
                phase: PublishPhase::Upload,
                source,
                resume: Some(Box::new(registered)),
            });
        }
        flow.record(FlowEvent::Uploaded);

        // Phase 4: certify
        let call = LedgerCall::CertifyBlob {
            object_id: registered.object_id,
            blob_id: registered.blob_id(),
        };
        let effects = match execute(self.ledger.as_ref(), &call, wallet).await {
            Ok(effects) => effects,
            Err(e) => {
                flow.record(FlowEvent::Failed(e.to_string()));
                return Err(PublishError {
                    phase: PublishPhase::Certify,
                    source: e.into(),
                    resume: Some(Box::new(registered)),
                });
            }
        };
        flow.record(FlowEvent::Certified);

        tracing::info!(
            blob_id = %registered.blob_id(),
            object_id = %registered.object_id,
            digest = %effects.digest,
            "Blob certified"
        );
        Ok(PublishedBlob {
            blob_id: registered.blob_id(),
            object_id: registered.object_id,
            end_epoch: registered.end_epoch,
            registration_digest: registered.registration_digest,
            certification_digest: effects.digest,
        })
    }

    async fn await_propagation(&self, registered: &RegisteredBlob) -> Result<(), PublishFailure> {
        match self.config.propagation {
            PropagationPolicy::FixedDelay(delay) => {
                tracing::debug!(
                    delay_ms = delay.as_millis() as u64,
                    "Waiting fixed propagation delay"
                );
                sleep(delay).await;
                Ok(())
            }
            PropagationPolicy::PollUntilVisible { interval, timeout } => {
                let started = Instant::now();
                let blob_id = registered.blob_id();
                let mut pending: Vec<&StorageNodeClient> = self.nodes.iter().collect();

                loop {
                    let mut still_pending = Vec::with_capacity(pending.len());
                    for node in pending {
                        match node
                            .registration_visible(&blob_id, &registered.registration_digest)
                            .await
                        {
                            Ok(true) => {}
                            Ok(false) => still_pending.push(node),
                            Err(e) => {
                                tracing::debug!(
                                    node = node.base_url(),
                                    error = %e,
                                    "Registration poll failed"
                                );
                                still_pending.push(node);
                            }
                        }
                    }
                    pending = still_pending;

                    if pending.is_empty() {
                        tracing::debug!(
                            blob_id = %blob_id,
                            waited_ms = started.elapsed().as_millis() as u64,
                            "Registration visible to all storage nodes"
                        );
                        return Ok(());
                    }
                    if started.elapsed() >= timeout {
                        return Err(PublishFailure::PropagationTimeout {
                            waited_ms: started.elapsed().as_millis(),
                        });
                    }
                    sleep(interval).await;
                }
            }
        }
    }

    /// Push metadata to every node, then sliver `j` to node `j % n`.
    async fn upload(&self, registered: &RegisteredBlob) -> Result<(), PublishFailure> {
        let metadata = &registered.encoded.metadata;
        let proof = registered.proof();
        let node_count = self.nodes.len();
        let mut accepted = vec![false; node_count];
        let mut last_error = None;

        for (i, node) in self.nodes.iter().enumerate() {
            match node.put_metadata(metadata, &proof).await {
                Ok(()) => accepted[i] = true,
                Err(e) => {
                    tracing::warn!(node = node.base_url(), error = %e, "Metadata upload rejected");
                    last_error = Some(e);
                }
            }
        }

        let mut stored = 0;
        for (j, sliver) in registered.encoded.slivers.iter().enumerate() {
            let target = j % node_count;
            if !accepted[target] {
                continue;
            }
            match self.nodes[target]
                .put_sliver(&metadata.blob_id, j, sliver)
                .await
            {
                Ok(()) => stored += 1,
                Err(e) => {
                    tracing::warn!(
                        node = self.nodes[target].base_url(),
                        sliver = j,
                        error = %e,
                        "Sliver upload failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        let required = metadata.data_slivers as usize;
        if stored < required {
            return Err(PublishFailure::InsufficientSlivers {
                stored,
                required,
                last_error,
            });
        }

        tracing::info!(
            blob_id = %metadata.blob_id,
            stored,
            total = registered.encoded.slivers.len(),
            "Slivers uploaded"
        );
        Ok(())
    }
}
