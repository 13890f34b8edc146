// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 GigNova

//! # Blob Storage Module
//!
//! Content-addressed blob storage backed by a set of storage nodes, with
//! blob lifetimes and certification tracked on the ledger.
//!
//! ## Publish
//!
//! ```text
//! encode ──> register (ledger) ──> propagation gate ──> upload (nodes) ──> certify (ledger)
//! ```
//!
//! ## Layout
//!
//! - `encoding`: sliver layout and blob ids
//! - `flow`: upload state machine
//! - `node`: storage node client
//! - `publisher`: the four-phase publish
//! - `reader`: aggregator reads with a storage node fallback

pub mod encoding;
pub mod flow;
pub mod node;
pub mod publisher;
pub mod reader;

pub use encoding::{encode, BlobMetadata, EncodedBlob, EncodingError};
pub use flow::{FlowEvent, UploadFlow, UploadState};
pub use node::{node_clients, RegistrationProof, StorageNodeClient, StorageNodeError};
pub use publisher::{
    BlobPublisher, PropagationPolicy, PublishError, PublishFailure, PublishPhase, PublishedBlob,
    PublisherConfig, RegisteredBlob, RetryPoint, DEFAULT_EPOCHS, DEFAULT_FIXED_DELAY,
    DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT,
};
pub use reader::{BlobReader, FetchError, DEFAULT_FETCH_TIMEOUT};
