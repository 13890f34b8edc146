// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Ledger calls, effects, objects and errors.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::models::{
    BlobId, DeliverableSubmission, Identity, JobId, MilestoneRecord, ObjectId, PolicyId, TxDigest,
};

/// A call into the GigNova marketplace contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    /// Create an access policy; the sender becomes its owner and only member.
    CreatePolicy,
    /// Declare intent to store a blob for `epochs` epochs.
    RegisterBlob {
        blob_id: BlobId,
        size: u64,
        epochs: u32,
    },
    /// Confirm a registered blob has been stored by the storage nodes.
    CertifyBlob {
        object_id: ObjectId,
        blob_id: BlobId,
    },
    /// Post a job with one escrowed amount per milestone.
    PostJob {
        title: String,
        milestone_amounts: Vec<U256>,
    },
    /// Accept a posted job as its freelancer.
    AcceptJob { job_id: JobId },
    /// Attach a deliverable to a milestone.
    SubmitMilestone {
        job_id: JobId,
        index: u32,
        submission: DeliverableSubmission,
    },
    /// Approve a submitted milestone; the contract grants the approver
    /// access to the deliverable's policy.
    ApproveMilestone { job_id: JobId, index: u32 },
}

impl LedgerCall {
    /// Short name used in logs and error messages.
    pub fn kind(&self) -> CallKind {
        match self {
            LedgerCall::CreatePolicy => CallKind::CreatePolicy,
            LedgerCall::RegisterBlob { .. } => CallKind::RegisterBlob,
            LedgerCall::CertifyBlob { .. } => CallKind::CertifyBlob,
            LedgerCall::PostJob { .. } => CallKind::PostJob,
            LedgerCall::AcceptJob { .. } => CallKind::AcceptJob,
            LedgerCall::SubmitMilestone { .. } => CallKind::SubmitMilestone,
            LedgerCall::ApproveMilestone { .. } => CallKind::ApproveMilestone,
        }
    }
}

/// Discriminant of [`LedgerCall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    CreatePolicy,
    RegisterBlob,
    CertifyBlob,
    PostJob,
    AcceptJob,
    SubmitMilestone,
    ApproveMilestone,
}

impl std::fmt::Display for CallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CallKind::CreatePolicy => "create_policy",
            CallKind::RegisterBlob => "register_blob",
            CallKind::CertifyBlob => "certify_blob",
            CallKind::PostJob => "post_job",
            CallKind::AcceptJob => "accept_job",
            CallKind::SubmitMilestone => "submit_milestone",
            CallKind::ApproveMilestone => "approve_milestone",
        };
        f.write_str(name)
    }
}

/// Event emitted by a finalized transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    PolicyCreated {
        policy_id: PolicyId,
        owner: Identity,
    },
    AccessGranted {
        policy_id: PolicyId,
        member: Identity,
    },
    BlobRegistered {
        object_id: ObjectId,
        blob_id: BlobId,
        owner: Identity,
        size: u64,
        end_epoch: u32,
    },
    BlobCertified {
        object_id: ObjectId,
        blob_id: BlobId,
    },
    JobPosted {
        job_id: JobId,
        client: Identity,
    },
    JobAccepted {
        job_id: JobId,
        freelancer: Identity,
    },
    MilestoneSubmitted {
        job_id: JobId,
        index: u32,
        policy_id: PolicyId,
    },
    MilestoneApproved {
        job_id: JobId,
        index: u32,
        approver: Identity,
    },
}

/// Effects of a finalized transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEffects {
    pub digest: TxDigest,
    pub sender: Identity,
    /// Block (or checkpoint) the transaction was included in.
    pub block_number: u64,
    pub events: Vec<LedgerEvent>,
}

impl TxEffects {
    pub fn created_policy(&self) -> Option<PolicyId> {
        self.events.iter().find_map(|e| match e {
            LedgerEvent::PolicyCreated { policy_id, .. } => Some(*policy_id),
            _ => None,
        })
    }

    /// `(object_id, end_epoch)` of the blob registered by this transaction.
    pub fn registered_blob(&self, blob_id: &BlobId) -> Option<(ObjectId, u32)> {
        self.events.iter().find_map(|e| match e {
            LedgerEvent::BlobRegistered {
                object_id,
                blob_id: registered,
                end_epoch,
                ..
            } if registered == blob_id => Some((*object_id, *end_epoch)),
            _ => None,
        })
    }

    pub fn posted_job(&self) -> Option<JobId> {
        self.events.iter().find_map(|e| match e {
            LedgerEvent::JobPosted { job_id, .. } => Some(*job_id),
            _ => None,
        })
    }
}

/// Reference to an on-chain object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectRef {
    Policy(PolicyId),
    Blob(ObjectId),
    Milestone { job_id: JobId, index: u32 },
}

/// Current state of an access policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicyState {
    pub id: PolicyId,
    pub owner: Identity,
    pub members: Vec<Identity>,
}

impl AccessPolicyState {
    pub fn is_member(&self, identity: &Identity) -> bool {
        self.members.contains(identity)
    }
}

/// Current state of a blob registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobObject {
    pub id: ObjectId,
    pub blob_id: BlobId,
    pub owner: Identity,
    pub size: u64,
    pub registered_epoch: u32,
    pub end_epoch: u32,
    pub certified: bool,
}

/// On-chain object state returned by [`super::Ledger::read_object`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerObject {
    AccessPolicy(AccessPolicyState),
    Blob(BlobObject),
    Milestone(MilestoneRecord),
}

/// Errors that can occur during ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Transaction was not accepted (wallet rejection, insufficient funds,
    /// nonce conflicts). Never retried.
    #[error("Transaction submission failed: {0}")]
    Submission(String),

    /// Transaction did not reach finality in time. The caller may retry the
    /// whole phase.
    #[error("Transaction {digest} not final after {waited_secs} seconds")]
    FinalityTimeout { digest: TxDigest, waited_secs: u64 },

    /// Transaction executed but reverted.
    #[error("Transaction {digest} reverted: {reason}")]
    Reverted { digest: TxDigest, reason: String },

    /// Finalized transaction lacked an event the caller depends on.
    #[error("Transaction {digest} is missing expected event {expected}")]
    MissingEvent {
        digest: TxDigest,
        expected: &'static str,
    },

    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Endpoint is a read-only view.
    #[error("Ledger endpoint is read-only")]
    ReadOnly,

    /// Invalid endpoint or contract configuration.
    #[error("Invalid ledger configuration: {0}")]
    Config(String),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
