// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use std::fmt;
use wgpeer_common::{PrivateKey, PublicKey};

/// Which WireGuard implementation backs the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backend {
	#[default]
	Kernel,
	Userspace,
}

impl Backend {
	pub fn as_str(&self) -> &'static str {
		match self {
			Backend::Kernel => "kernel",
			Backend::Userspace => "userspace",
		}
	}
}

impl fmt::Display for Backend {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One peer entry in a configure call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConfig {
	pub public_key: PublicKey,
	pub allowed_ips: Vec<IpNet>,
	/// Drop the peer's existing allowed IPs before adding `allowed_ips`.
	pub replace_allowed_ips: bool,
	/// Remove the peer instead of adding or updating it.
	pub remove: bool,
}

impl PeerConfig {
	pub fn upsert(public_key: PublicKey, allowed_ips: Vec<IpNet>) -> Self {
		Self {
			public_key,
			allowed_ips,
			replace_allowed_ips: true,
			remove: false,
		}
	}

	pub fn remove(public_key: PublicKey) -> Self {
		Self {
			public_key,
			allowed_ips: Vec::new(),
			replace_allowed_ips: false,
			remove: true,
		}
	}
}

/// A configure call against a WireGuard interface.
///
/// With `replace_peers` set, every peer not listed in `peers` is removed from
/// the interface; otherwise `peers` is applied on top of the current table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceConfig {
	pub private_key: Option<PrivateKey>,
	pub listen_port: Option<u16>,
	pub replace_peers: bool,
	pub peers: Vec<PeerConfig>,
}

/// Live state of one peer as reported by the interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
	pub public_key: PublicKey,
	pub allowed_ips: Vec<IpNet>,
	pub last_handshake: Option<DateTime<Utc>>,
	pub rx_bytes: u64,
	pub tx_bytes: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceInfo {
	pub public_key: Option<PublicKey>,
	pub listen_port: Option<u16>,
	pub peers: Vec<PeerInfo>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backend_display_names() {
		assert_eq!(Backend::default(), Backend::Kernel);
		assert_eq!(Backend::Kernel.to_string(), "kernel");
		assert_eq!(Backend::Userspace.to_string(), "userspace");
	}

	#[test]
	fn upsert_replaces_allowed_ips() {
		let key = *wgpeer_common::KeyPair::generate().public_key();
		let peer = PeerConfig::upsert(key, vec!["10.0.0.2/32".parse().unwrap()]);
		assert!(peer.replace_allowed_ips);
		assert!(!peer.remove);

		let removal = PeerConfig::remove(key);
		assert!(removal.remove);
		assert!(removal.allowed_ips.is_empty());
	}
}
