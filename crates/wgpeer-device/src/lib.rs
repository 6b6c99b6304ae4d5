// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard interface boundary for the wgpeer daemon.
//!
//! [`WgDevice`] is the only way the daemon touches the tunnel. [`KernelDevice`]
//! drives a real interface through `wireguard-control`; [`MemoryDevice`] keeps
//! the peer table in process. [`Reconciler`] turns the desired peer set into
//! configure calls.

pub mod config;
pub mod device;
pub mod error;
pub mod kernel;
pub mod memory;
pub mod reconciler;

pub use config::{Backend, DeviceConfig, DeviceInfo, PeerConfig, PeerInfo};
pub use device::WgDevice;
pub use error::{DeviceError, KeyRejection, ReconcileError, Result};
pub use kernel::KernelDevice;
pub use memory::MemoryDevice;
pub use reconciler::{DesiredPeer, Reconciler, SyncReport};
