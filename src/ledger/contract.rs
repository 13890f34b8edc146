// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! GigNova marketplace contract interface.
//!
//! ABI encoding of [`LedgerCall`]s and decoding of contract events into
//! [`LedgerEvent`]s.

use alloy::{primitives::Address, rpc::types::Log, sol, sol_types::SolCall};

use super::types::{LedgerCall, LedgerEvent};
use crate::models::{BlobId, DeliverableSubmission, Nonce, ObjectId, PolicyId};

sol! {
    #[sol(rpc)]
    interface IGigNova {
        struct Deliverable {
            bytes32 blobId;
            bytes32 blobObject;
            bytes32 policyId;
            string nonce;
            string previewUrl;
            string fileName;
            uint64 fileSize;
        }

        event PolicyCreated(bytes32 indexed policyId, address indexed owner);
        event AccessGranted(bytes32 indexed policyId, address indexed member);
        event BlobRegistered(bytes32 indexed objectId, bytes32 indexed blobId, address owner, uint64 size, uint32 endEpoch);
        event BlobCertified(bytes32 indexed objectId, bytes32 indexed blobId);
        event JobPosted(uint64 indexed jobId, address indexed client);
        event JobAccepted(uint64 indexed jobId, address indexed freelancer);
        event MilestoneSubmitted(uint64 indexed jobId, uint32 indexed index, bytes32 policyId);
        event MilestoneApproved(uint64 indexed jobId, uint32 indexed index, address approver);

        function createPolicy() external returns (bytes32);
        function registerBlob(bytes32 blobId, uint64 size, uint32 epochs) external returns (bytes32);
        function certifyBlob(bytes32 objectId, bytes32 blobId) external;
        function postJob(string title, uint256[] milestoneAmounts) external payable returns (uint64);
        function acceptJob(uint64 jobId) external;
        function submitMilestone(uint64 jobId, uint32 index, Deliverable deliverable) external;
        function approveMilestone(uint64 jobId, uint32 index) external;

        function currentEpoch() external view returns (uint32);
        function policy(bytes32 policyId) external view returns (bool exists, address owner, address[] members);
        function blob(bytes32 objectId) external view returns (bool exists, bytes32 blobId, address owner, uint64 size, uint32 registeredEpoch, uint32 endEpoch, bool certified);
        function milestone(uint64 jobId, uint32 index) external view returns (bool exists, uint8 state, address client, address freelancer, bool hasDeliverable, Deliverable deliverable);
    }
}

impl From<&DeliverableSubmission> for IGigNova::Deliverable {
    fn from(s: &DeliverableSubmission) -> Self {
        Self {
            blobId: s.blob_id.0,
            blobObject: s.blob_object_id.0,
            policyId: s.policy_id.0,
            nonce: s.nonce.to_string(),
            previewUrl: s.preview_url.clone(),
            fileName: s.file_name.clone(),
            fileSize: s.file_size,
        }
    }
}

impl From<IGigNova::Deliverable> for DeliverableSubmission {
    fn from(d: IGigNova::Deliverable) -> Self {
        Self {
            blob_id: BlobId(d.blobId),
            blob_object_id: ObjectId(d.blobObject),
            preview_url: d.previewUrl,
            policy_id: PolicyId(d.policyId),
            nonce: Nonce::from(d.nonce),
            file_name: d.fileName,
            file_size: d.fileSize,
        }
    }
}

/// ABI-encode a call as transaction input.
pub fn encode_call(call: &LedgerCall) -> Vec<u8> {
    match call {
        LedgerCall::CreatePolicy => IGigNova::createPolicyCall {}.abi_encode(),
        LedgerCall::RegisterBlob {
            blob_id,
            size,
            epochs,
        } => IGigNova::registerBlobCall {
            blobId: blob_id.0,
            size: *size,
            epochs: *epochs,
        }
        .abi_encode(),
        LedgerCall::CertifyBlob { object_id, blob_id } => IGigNova::certifyBlobCall {
            objectId: object_id.0,
            blobId: blob_id.0,
        }
        .abi_encode(),
        LedgerCall::PostJob {
            title,
            milestone_amounts,
        } => IGigNova::postJobCall {
            title: title.clone(),
            milestoneAmounts: milestone_amounts.clone(),
        }
        .abi_encode(),
        LedgerCall::AcceptJob { job_id } => IGigNova::acceptJobCall { jobId: *job_id }.abi_encode(),
        LedgerCall::SubmitMilestone {
            job_id,
            index,
            submission,
        } => IGigNova::submitMilestoneCall {
            jobId: *job_id,
            index: *index,
            deliverable: submission.into(),
        }
        .abi_encode(),
        LedgerCall::ApproveMilestone { job_id, index } => IGigNova::approveMilestoneCall {
            jobId: *job_id,
            index: *index,
        }
        .abi_encode(),
    }
}

/// Decode a receipt log emitted by the contract at `contract`.
///
/// Logs from other contracts and unknown topics yield `None`.
pub fn decode_event(contract: Address, log: &Log) -> Option<LedgerEvent> {
    if log.address() != contract {
        return None;
    }

    if let Ok(e) = log.log_decode::<IGigNova::PolicyCreated>() {
        let e = e.inner.data;
        return Some(LedgerEvent::PolicyCreated {
            policy_id: PolicyId(e.policyId),
            owner: e.owner,
        });
    }
    if let Ok(e) = log.log_decode::<IGigNova::AccessGranted>() {
        let e = e.inner.data;
        return Some(LedgerEvent::AccessGranted {
            policy_id: PolicyId(e.policyId),
            member: e.member,
        });
    }
    if let Ok(e) = log.log_decode::<IGigNova::BlobRegistered>() {
        let e = e.inner.data;
        return Some(LedgerEvent::BlobRegistered {
            object_id: ObjectId(e.objectId),
            blob_id: BlobId(e.blobId),
            owner: e.owner,
            size: e.size,
            end_epoch: e.endEpoch,
        });
    }
    if let Ok(e) = log.log_decode::<IGigNova::BlobCertified>() {
        let e = e.inner.data;
        return Some(LedgerEvent::BlobCertified {
            object_id: ObjectId(e.objectId),
            blob_id: BlobId(e.blobId),
        });
    }
    if let Ok(e) = log.log_decode::<IGigNova::JobPosted>() {
        let e = e.inner.data;
        return Some(LedgerEvent::JobPosted {
            job_id: e.jobId,
            client: e.client,
        });
    }
    if let Ok(e) = log.log_decode::<IGigNova::JobAccepted>() {
        let e = e.inner.data;
        return Some(LedgerEvent::JobAccepted {
            job_id: e.jobId,
            freelancer: e.freelancer,
        });
    }
    if let Ok(e) = log.log_decode::<IGigNova::MilestoneSubmitted>() {
        let e = e.inner.data;
        return Some(LedgerEvent::MilestoneSubmitted {
            job_id: e.jobId,
            index: e.index,
            policy_id: PolicyId(e.policyId),
        });
    }
    if let Ok(e) = log.log_decode::<IGigNova::MilestoneApproved>() {
        let e = e.inner.data;
        return Some(LedgerEvent::MilestoneApproved {
            job_id: e.jobId,
            index: e.index,
            approver: e.approver,
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{LogData, B256, U256};
    use alloy::sol_types::SolEvent;

    fn rpc_log(address: Address, data: LogData) -> Log {
        Log {
            inner: alloy::primitives::Log { address, data },
            ..Default::default()
        }
    }

    #[test]
    fn encodes_calls_with_selectors() {
        let input = encode_call(&LedgerCall::CreatePolicy);
        assert_eq!(&input[..4], IGigNova::createPolicyCall::SELECTOR.as_slice());

        let input = encode_call(&LedgerCall::RegisterBlob {
            blob_id: BlobId(B256::repeat_byte(1)),
            size: 42,
            epochs: 5,
        });
        let decoded = IGigNova::registerBlobCall::abi_decode(&input).unwrap();
        assert_eq!(decoded.blobId, B256::repeat_byte(1));
        assert_eq!(decoded.size, 42);
        assert_eq!(decoded.epochs, 5);

        let input = encode_call(&LedgerCall::PostJob {
            title: "Logo".to_string(),
            milestone_amounts: vec![U256::from(1u64), U256::from(2u64)],
        });
        let decoded = IGigNova::postJobCall::abi_decode(&input).unwrap();
        assert_eq!(decoded.milestoneAmounts.len(), 2);
    }

    #[test]
    fn deliverable_converts_both_ways() {
        let submission = DeliverableSubmission {
            blob_id: BlobId(B256::repeat_byte(1)),
            blob_object_id: ObjectId(B256::repeat_byte(2)),
            preview_url: "https://example.com/p.png".to_string(),
            policy_id: PolicyId(B256::repeat_byte(3)),
            nonce: Nonce::from("n1"),
            file_name: "a.zip".to_string(),
            file_size: 9,
        };
        let sol: IGigNova::Deliverable = (&submission).into();
        assert_eq!(DeliverableSubmission::from(sol), submission);
    }

    #[test]
    fn decodes_contract_events_only() {
        let contract = Address::repeat_byte(0xcc);
        let event = IGigNova::PolicyCreated {
            policyId: B256::repeat_byte(5),
            owner: Address::repeat_byte(0x11),
        };
        let data = event.encode_log_data();

        let decoded = decode_event(contract, &rpc_log(contract, data.clone()));
        assert_eq!(
            decoded,
            Some(LedgerEvent::PolicyCreated {
                policy_id: PolicyId(B256::repeat_byte(5)),
                owner: Address::repeat_byte(0x11),
            })
        );

        let foreign = decode_event(contract, &rpc_log(Address::repeat_byte(0xdd), data));
        assert_eq!(foreign, None);
    }
}
