// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Marketplace transactions around a deliverable.
//!
//! The client posts a job with escrowed milestone amounts, the freelancer
//! accepts it and submits deliverables, and the client approves them.
//! Approval is the access grant: the contract adds the approver to the
//! deliverable's access policy. Every call waits for finality.

use alloy::primitives::U256;

use crate::ledger::{
    execute, Ledger, LedgerCall, LedgerError, LedgerObject, ObjectRef, TxEffects, Wallet,
};
use crate::models::{DeliverableSubmission, JobId, MilestoneRecord};

#[derive(Debug, thiserror::Error)]
pub enum MarketplaceError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Job posting produced no job id")]
    NoJobId,
}

/// Post a job; returns the new job id.
pub async fn post_job(
    ledger: &dyn Ledger,
    client: &Wallet,
    title: &str,
    milestone_amounts: Vec<U256>,
) -> Result<JobId, MarketplaceError> {
    let milestones = milestone_amounts.len();
    let call = LedgerCall::PostJob {
        title: title.to_string(),
        milestone_amounts,
    };
    let job_id = execute(ledger, &call, client)
        .await?
        .posted_job()
        .ok_or(MarketplaceError::NoJobId)?;
    tracing::info!(job_id, milestones, client = %client.address(), "Job posted");
    Ok(job_id)
}

pub async fn accept_job(
    ledger: &dyn Ledger,
    freelancer: &Wallet,
    job_id: JobId,
) -> Result<TxEffects, MarketplaceError> {
    let effects = execute(ledger, &LedgerCall::AcceptJob { job_id }, freelancer).await?;
    tracing::info!(job_id, freelancer = %freelancer.address(), "Job accepted");
    Ok(effects)
}

/// Attach a deliverable to milestone `index`.
pub async fn submit_milestone(
    ledger: &dyn Ledger,
    freelancer: &Wallet,
    job_id: JobId,
    index: u32,
    submission: DeliverableSubmission,
) -> Result<TxEffects, MarketplaceError> {
    let policy_id = submission.policy_id;
    let call = LedgerCall::SubmitMilestone {
        job_id,
        index,
        submission,
    };
    let effects = execute(ledger, &call, freelancer).await?;
    tracing::info!(job_id, index, policy_id = %policy_id, "Milestone submitted");
    Ok(effects)
}

/// Approve milestone `index`, granting the approver access to its
/// deliverable.
pub async fn approve_milestone(
    ledger: &dyn Ledger,
    client: &Wallet,
    job_id: JobId,
    index: u32,
) -> Result<TxEffects, MarketplaceError> {
    let effects = execute(ledger, &LedgerCall::ApproveMilestone { job_id, index }, client).await?;
    tracing::info!(job_id, index, approver = %client.address(), "Milestone approved");
    Ok(effects)
}

pub async fn read_milestone(
    ledger: &dyn Ledger,
    job_id: JobId,
    index: u32,
) -> Result<Option<MilestoneRecord>, MarketplaceError> {
    match ledger
        .read_object(ObjectRef::Milestone { job_id, index })
        .await?
    {
        Some(LedgerObject::Milestone(record)) => Ok(Some(record)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    use crate::ledger::InMemoryLedger;
    use crate::models::{BlobId, MilestoneState, Nonce, ObjectId, PolicyId};

    fn deliverable(policy_id: PolicyId) -> DeliverableSubmission {
        DeliverableSubmission {
            blob_id: BlobId(B256::repeat_byte(1)),
            blob_object_id: ObjectId(B256::repeat_byte(2)),
            preview_url: "https://example.com/preview.png".to_string(),
            policy_id,
            nonce: Nonce::generate(),
            file_name: "logo.svg".to_string(),
            file_size: 42,
        }
    }

    #[tokio::test]
    async fn milestone_lifecycle() {
        let ledger = InMemoryLedger::new();
        let client = Wallet::random().unwrap();
        let freelancer = Wallet::random().unwrap();
        let amount = U256::from(250_000_000_000_000_000u64);

        let job_id = post_job(&ledger, &client, "Logo design", vec![amount, amount])
            .await
            .unwrap();
        accept_job(&ledger, &freelancer, job_id).await.unwrap();

        let record = read_milestone(&ledger, job_id, 1).await.unwrap().unwrap();
        assert_eq!(record.state, MilestoneState::Open);
        assert_eq!(record.freelancer, Some(freelancer.address()));

        let policy_id = execute(&ledger, &LedgerCall::CreatePolicy, &freelancer)
            .await
            .unwrap()
            .created_policy()
            .unwrap();
        let submission = deliverable(policy_id);
        submit_milestone(&ledger, &freelancer, job_id, 1, submission.clone())
            .await
            .unwrap();

        let record = read_milestone(&ledger, job_id, 1).await.unwrap().unwrap();
        assert_eq!(record.state, MilestoneState::Submitted);
        assert_eq!(record.submission, Some(submission));

        approve_milestone(&ledger, &client, job_id, 1)
            .await
            .unwrap();
        let record = read_milestone(&ledger, job_id, 1).await.unwrap().unwrap();
        assert_eq!(record.state, MilestoneState::Approved);

        assert!(read_milestone(&ledger, job_id, 5).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn only_the_client_approves() {
        let ledger = InMemoryLedger::new();
        let client = Wallet::random().unwrap();
        let freelancer = Wallet::random().unwrap();

        let job_id = post_job(&ledger, &client, "Audit", vec![U256::from(1u64)])
            .await
            .unwrap();
        accept_job(&ledger, &freelancer, job_id).await.unwrap();

        let result = approve_milestone(&ledger, &freelancer, job_id, 0).await;
        assert!(matches!(
            result,
            Err(MarketplaceError::Ledger(LedgerError::Reverted { .. }))
        ));
    }
}
