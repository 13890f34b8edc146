// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! GigNova - Encrypted Deliverable Pipeline
//!
//! Freelancers submit milestone deliverables as ciphertext blobs bound to an
//! on-chain access policy; clients download and decrypt them once the
//! milestone is approved.
//!
//! ## Modules
//!
//! - `pipeline` - Submission coordinator and retrieval service
//! - `crypto` - Identity-bound encryption and key servers
//! - `storage` - Erasure-coded blob publishing and reading
//! - `ledger` - Marketplace contract client (EVM and in-memory)
//! - `session` - Time-limited session capabilities
//! - `marketplace` - Job and milestone lifecycle calls
//! - `client` - Wiring from configuration
//! - `api`, `state`, `store`, `expiry` - Local development network (Axum)

pub mod api;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod expiry;
pub mod ledger;
pub mod logging;
pub mod marketplace;
pub mod models;
pub mod pipeline;
pub mod session;
pub mod state;
pub mod storage;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;
