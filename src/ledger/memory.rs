// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! In-memory emulation of the marketplace contract.
//!
//! Used by tests and the local development network. Transactions execute
//! and finalize on submission. [`InMemoryLedger::replica`] returns a
//! read-only view that only observes transactions and object versions
//! older than a configurable lag, reproducing the replication delay between
//! the canonical chain and the RPC replica storage nodes consult.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use alloy::primitives::{keccak256, Address, B256, U256};
use async_trait::async_trait;

use super::types::*;
use super::{Ledger, Wallet};
use crate::models::{
    DeliverableSubmission, Identity, JobId, MilestoneRecord, MilestoneState, ObjectId, PolicyId,
    TxDigest,
};

/// Epoch the emulated chain starts in.
const GENESIS_EPOCH: u32 = 1;

/// Object state with its full version history.
#[derive(Debug)]
struct Versioned<T> {
    history: Vec<(Instant, T)>,
}

impl<T: Clone> Versioned<T> {
    fn new(value: T) -> Self {
        Self {
            history: vec![(Instant::now(), value)],
        }
    }

    fn latest(&self) -> &T {
        // history is never empty
        &self.history[self.history.len() - 1].1
    }

    fn update(&mut self, f: impl FnOnce(&mut T)) {
        let mut next = self.latest().clone();
        f(&mut next);
        self.history.push((Instant::now(), next));
    }

    /// Newest version at least `lag` old.
    fn visible(&self, lag: Duration, now: Instant) -> Option<&T> {
        self.history
            .iter()
            .rev()
            .find(|(at, _)| *at + lag <= now)
            .map(|(_, value)| value)
    }
}

#[derive(Debug, Clone)]
struct MilestoneSlot {
    amount: U256,
    state: MilestoneState,
    submission: Option<DeliverableSubmission>,
}

#[derive(Debug, Clone)]
struct JobRecord {
    client: Identity,
    freelancer: Option<Identity>,
    milestones: Vec<MilestoneSlot>,
}

#[derive(Debug)]
struct CommittedTx {
    finalized_at: Instant,
    outcome: Result<TxEffects, String>,
}

#[derive(Debug, Default)]
struct State {
    epoch: u32,
    block: u64,
    counter: u64,
    next_job: JobId,
    txs: HashMap<TxDigest, CommittedTx>,
    policies: HashMap<PolicyId, Versioned<AccessPolicyState>>,
    blobs: HashMap<ObjectId, Versioned<BlobObject>>,
    jobs: HashMap<JobId, Versioned<JobRecord>>,
    rejections: HashMap<CallKind, String>,
}

impl State {
    fn derive_id(&mut self, domain: &[u8], sender: &Address) -> B256 {
        self.counter += 1;
        let mut preimage = Vec::with_capacity(domain.len() + 28);
        preimage.extend_from_slice(domain);
        preimage.extend_from_slice(sender.as_slice());
        preimage.extend_from_slice(&self.counter.to_be_bytes());
        keccak256(preimage)
    }

    /// Execute a call against the contract rules. `Err` is a revert reason.
    fn execute(&mut self, call: &LedgerCall, sender: Address) -> Result<Vec<LedgerEvent>, String> {
        match call {
            LedgerCall::CreatePolicy => {
                let id = PolicyId(self.derive_id(b"policy", &sender));
                self.policies.insert(
                    id,
                    Versioned::new(AccessPolicyState {
                        id,
                        owner: sender,
                        members: vec![sender],
                    }),
                );
                Ok(vec![LedgerEvent::PolicyCreated {
                    policy_id: id,
                    owner: sender,
                }])
            }
            LedgerCall::RegisterBlob {
                blob_id,
                size,
                epochs,
            } => {
                if *epochs == 0 {
                    return Err("storage duration must be at least one epoch".to_string());
                }
                let id = ObjectId(self.derive_id(b"blob", &sender));
                let end_epoch = self.epoch.saturating_add(*epochs);
                self.blobs.insert(
                    id,
                    Versioned::new(BlobObject {
                        id,
                        blob_id: *blob_id,
                        owner: sender,
                        size: *size,
                        registered_epoch: self.epoch,
                        end_epoch,
                        certified: false,
                    }),
                );
                Ok(vec![LedgerEvent::BlobRegistered {
                    object_id: id,
                    blob_id: *blob_id,
                    owner: sender,
                    size: *size,
                    end_epoch,
                }])
            }
            LedgerCall::CertifyBlob { object_id, blob_id } => {
                let blob = self
                    .blobs
                    .get_mut(object_id)
                    .ok_or_else(|| format!("unknown blob object {object_id}"))?;
                let current = blob.latest();
                if current.blob_id != *blob_id {
                    return Err("blob id does not match registration".to_string());
                }
                if current.owner != sender {
                    return Err("only the blob owner can certify".to_string());
                }
                if current.certified {
                    return Err("blob already certified".to_string());
                }
                blob.update(|b| b.certified = true);
                Ok(vec![LedgerEvent::BlobCertified {
                    object_id: *object_id,
                    blob_id: *blob_id,
                }])
            }
            LedgerCall::PostJob {
                milestone_amounts, ..
            } => {
                if milestone_amounts.is_empty() {
                    return Err("a job needs at least one milestone".to_string());
                }
                self.next_job += 1;
                let job_id = self.next_job;
                self.jobs.insert(
                    job_id,
                    Versioned::new(JobRecord {
                        client: sender,
                        freelancer: None,
                        milestones: milestone_amounts
                            .iter()
                            .map(|amount| MilestoneSlot {
                                amount: *amount,
                                state: MilestoneState::Open,
                                submission: None,
                            })
                            .collect(),
                    }),
                );
                Ok(vec![LedgerEvent::JobPosted {
                    job_id,
                    client: sender,
                }])
            }
            LedgerCall::AcceptJob { job_id } => {
                let job = self
                    .jobs
                    .get_mut(job_id)
                    .ok_or_else(|| format!("unknown job {job_id}"))?;
                let current = job.latest();
                if current.freelancer.is_some() {
                    return Err("job already accepted".to_string());
                }
                if current.client == sender {
                    return Err("client cannot accept their own job".to_string());
                }
                job.update(|j| j.freelancer = Some(sender));
                Ok(vec![LedgerEvent::JobAccepted {
                    job_id: *job_id,
                    freelancer: sender,
                }])
            }
            LedgerCall::SubmitMilestone {
                job_id,
                index,
                submission,
            } => {
                let policy_owner = self
                    .policies
                    .get(&submission.policy_id)
                    .map(|p| p.latest().owner)
                    .ok_or_else(|| format!("unknown policy {}", submission.policy_id))?;
                if policy_owner != sender {
                    return Err("deliverable policy is not owned by the submitter".to_string());
                }
                let job = self
                    .jobs
                    .get_mut(job_id)
                    .ok_or_else(|| format!("unknown job {job_id}"))?;
                let current = job.latest();
                if current.freelancer != Some(sender) {
                    return Err("only the job's freelancer can submit".to_string());
                }
                let slot = current
                    .milestones
                    .get(*index as usize)
                    .ok_or_else(|| format!("job {job_id} has no milestone {index}"))?;
                if slot.state == MilestoneState::Approved {
                    return Err("milestone already approved".to_string());
                }
                job.update(|j| {
                    let slot = &mut j.milestones[*index as usize];
                    slot.state = MilestoneState::Submitted;
                    slot.submission = Some(submission.clone());
                });
                Ok(vec![LedgerEvent::MilestoneSubmitted {
                    job_id: *job_id,
                    index: *index,
                    policy_id: submission.policy_id,
                }])
            }
            LedgerCall::ApproveMilestone { job_id, index } => {
                let job = self
                    .jobs
                    .get_mut(job_id)
                    .ok_or_else(|| format!("unknown job {job_id}"))?;
                let current = job.latest();
                if current.client != sender {
                    return Err("only the job's client can approve".to_string());
                }
                let slot = current
                    .milestones
                    .get(*index as usize)
                    .ok_or_else(|| format!("job {job_id} has no milestone {index}"))?;
                if slot.state != MilestoneState::Submitted {
                    return Err("milestone has no pending submission".to_string());
                }
                let policy_id = slot
                    .submission
                    .as_ref()
                    .map(|s| s.policy_id)
                    .ok_or_else(|| "milestone has no deliverable".to_string())?;
                job.update(|j| j.milestones[*index as usize].state = MilestoneState::Approved);

                let mut events = Vec::new();
                if let Some(policy) = self.policies.get_mut(&policy_id) {
                    if !policy.latest().is_member(&sender) {
                        policy.update(|p| p.members.push(sender));
                        events.push(LedgerEvent::AccessGranted {
                            policy_id,
                            member: sender,
                        });
                    }
                }
                events.push(LedgerEvent::MilestoneApproved {
                    job_id: *job_id,
                    index: *index,
                    approver: sender,
                });
                Ok(events)
            }
        }
    }

    fn milestone(&self, job: &JobRecord, job_id: JobId, index: u32) -> Option<MilestoneRecord> {
        job.milestones.get(index as usize).map(|slot| MilestoneRecord {
            job_id,
            index,
            state: slot.state,
            client: job.client,
            freelancer: job.freelancer,
            submission: slot.submission.clone(),
        })
    }

    fn read(&self, object: ObjectRef, lag: Duration, now: Instant) -> Option<LedgerObject> {
        match object {
            ObjectRef::Policy(id) => self
                .policies
                .get(&id)
                .and_then(|p| p.visible(lag, now))
                .cloned()
                .map(LedgerObject::AccessPolicy),
            ObjectRef::Blob(id) => self
                .blobs
                .get(&id)
                .and_then(|b| b.visible(lag, now))
                .cloned()
                .map(LedgerObject::Blob),
            ObjectRef::Milestone { job_id, index } => self
                .jobs
                .get(&job_id)
                .and_then(|j| j.visible(lag, now))
                .and_then(|job| self.milestone(job, job_id, index))
                .map(LedgerObject::Milestone),
        }
    }

    fn visible_effects(
        &self,
        digest: TxDigest,
        lag: Duration,
        now: Instant,
    ) -> LedgerResult<Option<TxEffects>> {
        match self.txs.get(&digest) {
            Some(tx) if tx.finalized_at + lag <= now => match &tx.outcome {
                Ok(effects) => Ok(Some(effects.clone())),
                Err(reason) => Err(LedgerError::Reverted {
                    digest,
                    reason: reason.clone(),
                }),
            },
            _ => Ok(None),
        }
    }
}

fn lock(state: &Mutex<State>) -> LedgerResult<MutexGuard<'_, State>> {
    state
        .lock()
        .map_err(|_| LedgerError::Rpc("ledger state lock poisoned".to_string()))
}

/// In-memory marketplace ledger.
#[derive(Debug, Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<State>>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                epoch: GENESIS_EPOCH,
                ..State::default()
            })),
        }
    }

    /// Read-only view that observes state only after `lag`.
    pub fn replica(&self, lag: Duration) -> ReplicaLedger {
        ReplicaLedger {
            state: Arc::clone(&self.state),
            lag,
        }
    }

    /// Make the next submission of `kind` fail with `reason`.
    pub fn reject_next(&self, kind: CallKind, reason: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.rejections.insert(kind, reason.into());
        }
    }

    /// Move the storage epoch forward.
    pub fn advance_epoch(&self, epochs: u32) {
        if let Ok(mut state) = self.state.lock() {
            state.epoch = state.epoch.saturating_add(epochs);
        }
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn submit(&self, call: &LedgerCall, wallet: &Wallet) -> LedgerResult<TxDigest> {
        let sender = wallet.address();
        let mut state = lock(&self.state)?;

        if let Some(reason) = state.rejections.remove(&call.kind()) {
            return Err(LedgerError::Submission(reason));
        }

        let digest = state.derive_id(b"tx", &sender);
        state.block += 1;
        let block_number = state.block;
        let outcome = state.execute(call, sender).map(|events| TxEffects {
            digest,
            sender,
            block_number,
            events,
        });
        if let Err(reason) = &outcome {
            tracing::debug!(call = %call.kind(), reason = %reason, "Emulated transaction reverted");
        }
        state.txs.insert(
            digest,
            CommittedTx {
                finalized_at: Instant::now(),
                outcome,
            },
        );
        Ok(digest)
    }

    async fn wait_for_finality(&self, digest: TxDigest) -> LedgerResult<TxEffects> {
        lock(&self.state)?
            .visible_effects(digest, Duration::ZERO, Instant::now())?
            .ok_or_else(|| LedgerError::Rpc(format!("unknown transaction {digest}")))
    }

    async fn effects(&self, digest: TxDigest) -> LedgerResult<Option<TxEffects>> {
        lock(&self.state)?.visible_effects(digest, Duration::ZERO, Instant::now())
    }

    async fn read_object(&self, object: ObjectRef) -> LedgerResult<Option<LedgerObject>> {
        Ok(lock(&self.state)?.read(object, Duration::ZERO, Instant::now()))
    }

    async fn current_epoch(&self) -> LedgerResult<u32> {
        Ok(lock(&self.state)?.epoch)
    }
}

/// Lagging read-only view of an [`InMemoryLedger`].
#[derive(Debug, Clone)]
pub struct ReplicaLedger {
    state: Arc<Mutex<State>>,
    lag: Duration,
}

impl ReplicaLedger {
    pub fn lag(&self) -> Duration {
        self.lag
    }
}

#[async_trait]
impl Ledger for ReplicaLedger {
    async fn submit(&self, _call: &LedgerCall, _wallet: &Wallet) -> LedgerResult<TxDigest> {
        Err(LedgerError::ReadOnly)
    }

    async fn wait_for_finality(&self, digest: TxDigest) -> LedgerResult<TxEffects> {
        let finalized_at = lock(&self.state)?
            .txs
            .get(&digest)
            .map(|tx| tx.finalized_at)
            .ok_or_else(|| LedgerError::Rpc(format!("unknown transaction {digest}")))?;

        let visible_at = finalized_at + self.lag;
        let now = Instant::now();
        if visible_at > now {
            tokio::time::sleep(visible_at - now).await;
        }

        lock(&self.state)?
            .visible_effects(digest, self.lag, Instant::now())?
            .ok_or_else(|| LedgerError::Rpc(format!("unknown transaction {digest}")))
    }

    async fn effects(&self, digest: TxDigest) -> LedgerResult<Option<TxEffects>> {
        lock(&self.state)?.visible_effects(digest, self.lag, Instant::now())
    }

    async fn read_object(&self, object: ObjectRef) -> LedgerResult<Option<LedgerObject>> {
        Ok(lock(&self.state)?.read(object, self.lag, Instant::now()))
    }

    async fn current_epoch(&self) -> LedgerResult<u32> {
        Ok(lock(&self.state)?.epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::execute;
    use crate::models::{BlobId, Nonce};

    fn submission(policy_id: PolicyId) -> DeliverableSubmission {
        DeliverableSubmission {
            blob_id: BlobId(B256::repeat_byte(1)),
            blob_object_id: ObjectId(B256::repeat_byte(2)),
            preview_url: "https://example.com/preview.png".to_string(),
            policy_id,
            nonce: Nonce::from("n1"),
            file_name: "work.zip".to_string(),
            file_size: 5,
        }
    }

    #[tokio::test]
    async fn create_policy_makes_sender_sole_member() {
        let ledger = InMemoryLedger::new();
        let alice = Wallet::random().unwrap();

        let effects = execute(&ledger, &LedgerCall::CreatePolicy, &alice)
            .await
            .unwrap();
        let policy_id = effects.created_policy().unwrap();

        match ledger.read_object(ObjectRef::Policy(policy_id)).await.unwrap() {
            Some(LedgerObject::AccessPolicy(policy)) => {
                assert_eq!(policy.owner, alice.address());
                assert_eq!(policy.members, vec![alice.address()]);
            }
            other => panic!("unexpected object: {other:?}"),
        }
    }

    #[tokio::test]
    async fn approval_grants_client_access() {
        let ledger = InMemoryLedger::new();
        let client = Wallet::random().unwrap();
        let freelancer = Wallet::random().unwrap();

        let job_id = execute(
            &ledger,
            &LedgerCall::PostJob {
                title: "Logo".to_string(),
                milestone_amounts: vec![U256::from(100u64)],
            },
            &client,
        )
        .await
        .unwrap()
        .posted_job()
        .unwrap();
        execute(&ledger, &LedgerCall::AcceptJob { job_id }, &freelancer)
            .await
            .unwrap();
        let policy_id = execute(&ledger, &LedgerCall::CreatePolicy, &freelancer)
            .await
            .unwrap()
            .created_policy()
            .unwrap();
        execute(
            &ledger,
            &LedgerCall::SubmitMilestone {
                job_id,
                index: 0,
                submission: submission(policy_id),
            },
            &freelancer,
        )
        .await
        .unwrap();

        let effects = execute(
            &ledger,
            &LedgerCall::ApproveMilestone { job_id, index: 0 },
            &client,
        )
        .await
        .unwrap();
        assert!(effects.events.contains(&LedgerEvent::AccessGranted {
            policy_id,
            member: client.address(),
        }));

        match ledger.read_object(ObjectRef::Policy(policy_id)).await.unwrap() {
            Some(LedgerObject::AccessPolicy(policy)) => {
                assert!(policy.is_member(&client.address()));
                assert!(policy.is_member(&freelancer.address()));
            }
            other => panic!("unexpected object: {other:?}"),
        }
    }

    #[tokio::test]
    async fn contract_rule_violations_revert() {
        let ledger = InMemoryLedger::new();
        let stranger = Wallet::random().unwrap();

        let result = execute(
            &ledger,
            &LedgerCall::ApproveMilestone {
                job_id: 42,
                index: 0,
            },
            &stranger,
        )
        .await;
        assert!(matches!(result, Err(LedgerError::Reverted { .. })));
    }

    #[tokio::test]
    async fn rejected_submission_fails_once() {
        let ledger = InMemoryLedger::new();
        let wallet = Wallet::random().unwrap();
        ledger.reject_next(CallKind::CreatePolicy, "user rejected the request");

        let first = ledger.submit(&LedgerCall::CreatePolicy, &wallet).await;
        assert!(matches!(first, Err(LedgerError::Submission(_))));

        let second = ledger.submit(&LedgerCall::CreatePolicy, &wallet).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn replica_observes_after_lag() {
        let ledger = InMemoryLedger::new();
        let replica = ledger.replica(Duration::from_millis(100));
        let wallet = Wallet::random().unwrap();

        let digest = ledger
            .submit(&LedgerCall::CreatePolicy, &wallet)
            .await
            .unwrap();
        let policy_id = ledger
            .wait_for_finality(digest)
            .await
            .unwrap()
            .created_policy()
            .unwrap();

        assert!(replica.effects(digest).await.unwrap().is_none());
        assert!(replica
            .read_object(ObjectRef::Policy(policy_id))
            .await
            .unwrap()
            .is_none());

        let effects = replica.wait_for_finality(digest).await.unwrap();
        assert_eq!(effects.created_policy(), Some(policy_id));
        assert!(replica
            .read_object(ObjectRef::Policy(policy_id))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn replica_is_read_only() {
        let ledger = InMemoryLedger::new();
        let wallet = Wallet::random().unwrap();
        let result = ledger
            .replica(Duration::ZERO)
            .submit(&LedgerCall::CreatePolicy, &wallet)
            .await;
        assert!(matches!(result, Err(LedgerError::ReadOnly)));
    }

    #[tokio::test]
    async fn registration_end_epoch_follows_current_epoch() {
        let ledger = InMemoryLedger::new();
        ledger.advance_epoch(4);
        let wallet = Wallet::random().unwrap();
        let blob_id = BlobId(B256::repeat_byte(7));

        let effects = execute(
            &ledger,
            &LedgerCall::RegisterBlob {
                blob_id,
                size: 10,
                epochs: 3,
            },
            &wallet,
        )
        .await
        .unwrap();
        let (_, end_epoch) = effects.registered_blob(&blob_id).unwrap();
        assert_eq!(end_epoch, GENESIS_EPOCH + 4 + 3);
    }
}
