// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! Upload flow state machine.
//!
//! ```text
//! Pending -> Encoded -> Registered -> Uploaded -> Certified
//!    \__________\___________\___________\-------> Failed(reason)
//! ```
//!
//! [`transition`] is pure; [`UploadFlow`] wraps it with logging for one
//! publish.

use std::fmt;

use crate::models::BlobId;

/// States of one publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    Pending,
    Encoded,
    Registered,
    Uploaded,
    Certified,
    Failed(String),
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Certified | UploadState::Failed(_))
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadState::Pending => f.write_str("pending"),
            UploadState::Encoded => f.write_str("encoded"),
            UploadState::Registered => f.write_str("registered"),
            UploadState::Uploaded => f.write_str("uploaded"),
            UploadState::Certified => f.write_str("certified"),
            UploadState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Outcome of a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    Encoded,
    Registered,
    Uploaded,
    Certified,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid upload transition from {from} on {event:?}")]
pub struct InvalidTransition {
    pub from: UploadState,
    pub event: FlowEvent,
}

/// Next state for `event` in `state`.
pub fn transition(
    state: &UploadState,
    event: &FlowEvent,
) -> Result<UploadState, InvalidTransition> {
    use FlowEvent as E;
    use UploadState as S;

    let next = match (state, event) {
        (S::Pending, E::Encoded) => S::Encoded,
        (S::Encoded, E::Registered) => S::Registered,
        (S::Registered, E::Uploaded) => S::Uploaded,
        (S::Uploaded, E::Certified) => S::Certified,
        (s, E::Failed(reason)) if !s.is_terminal() => S::Failed(reason.clone()),
        _ => {
            return Err(InvalidTransition {
                from: state.clone(),
                event: event.clone(),
            })
        }
    };
    Ok(next)
}

/// Tracks the state of one publish.
#[derive(Debug, Clone)]
pub struct UploadFlow {
    blob_id: Option<BlobId>,
    state: UploadState,
}

impl Default for UploadFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadFlow {
    pub fn new() -> Self {
        Self {
            blob_id: None,
            state: UploadState::Pending,
        }
    }

    /// Flow for a blob whose registration already committed.
    pub fn resumed(blob_id: BlobId) -> Self {
        Self {
            blob_id: Some(blob_id),
            state: UploadState::Registered,
        }
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    pub fn set_blob_id(&mut self, blob_id: BlobId) {
        self.blob_id = Some(blob_id);
    }

    pub fn advance(&mut self, event: FlowEvent) -> Result<&UploadState, InvalidTransition> {
        let next = transition(&self.state, &event)?;
        match &next {
            UploadState::Failed(reason) => tracing::warn!(
                blob_id = ?self.blob_id,
                from = %self.state,
                reason = %reason,
                "Upload flow failed"
            ),
            _ => tracing::debug!(
                blob_id = ?self.blob_id,
                from = %self.state,
                to = %next,
                "Upload flow advanced"
            ),
        }
        self.state = next;
        Ok(&self.state)
    }

    /// [`advance`](Self::advance), logging a rejected transition instead of
    /// returning it. Returns whether the state changed.
    pub fn record(&mut self, event: FlowEvent) -> bool {
        match self.advance(event) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(blob_id = ?self.blob_id, error = %e, "Upload flow out of order");
                false
            }
        }
    }
}
