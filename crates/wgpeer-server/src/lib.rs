// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer management for a WireGuard interface.
//!
//! [`Server`] ties the [`PeerStore`](wgpeer_store::PeerStore), the
//! [`IpAllocator`] and the [`Reconciler`](wgpeer_device::Reconciler) together
//! behind the operations an API layer exposes: create, edit and delete
//! configs, enable and disable users, list configs and live connections.

pub mod allocator;
pub mod connections;
pub mod error;
pub mod server;

pub use allocator::IpAllocator;
pub use connections::{Connection, ConnectionMonitor, Connections, REJECT_AFTER_SECS};
pub use error::{AllocError, ConflictKind, Result, ServerError};
pub use server::{
	AllocationOutcome, CreatedConfig, GeneratedConfig, Server, ServerSettings, MAX_ALLOCATION_ATTEMPTS,
};
