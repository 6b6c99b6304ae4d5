// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;

use crate::config::{DeviceConfig, DeviceInfo};
use crate::error::DeviceError;

/// The WireGuard interface as seen by the daemon: push a peer table, read
/// live peer statistics. Everything else about the tunnel is opaque.
#[async_trait]
pub trait WgDevice: Send + Sync {
	async fn configure(&self, interface: &str, config: DeviceConfig) -> Result<(), DeviceError>;

	async fn device(&self, interface: &str) -> Result<DeviceInfo, DeviceError>;
}
