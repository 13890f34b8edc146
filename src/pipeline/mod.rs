// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! # Encrypted Deliverable Pipeline
//!
//! ```text
//! submit:   create policy -> nonce -> encrypt -> publish blob -> DeliverableSubmission
//! retrieve: capability -> fetch blob -> parse -> identity check -> decrypt
//! ```
//!
//! Access is granted between the two by approving the milestone
//! (see [`crate::marketplace::approve_milestone`]).

pub mod retrieve;
pub mod submit;

pub use retrieve::{RetrievalService, RetrieveError};
pub use submit::{
    PendingSubmission, SubmissionCoordinator, SubmitError, SubmitStep, DEFAULT_MAX_FILE_SIZE,
};
