// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable peer store for the wgpeer daemon.
//!
//! Holds the server's WireGuard identity and the map of users to client
//! configs, persisted as a single JSON document (mode 0600) that is rewritten
//! in full on every mutation.

pub mod document;
pub mod error;
pub mod store;

pub use document::StorageDocument;
pub use error::{Result, StoreError};
pub use store::PeerStore;
