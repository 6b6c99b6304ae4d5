// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections for wgpeerd.

pub mod logging;
pub mod storage;
pub mod wireguard;

pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use storage::{StorageConfig, StorageConfigLayer};
pub use wireguard::{WgBackend, WireguardConfig, WireguardConfigLayer};
