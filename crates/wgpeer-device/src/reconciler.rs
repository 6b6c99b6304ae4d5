// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pushes the desired peer set to a WireGuard interface.
//!
//! Peer keys arrive in text form. A key that does not decode is left out of
//! the push and reported in the [`SyncReport`]; the remaining peers are still
//! applied.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use wgpeer_common::{host_net, PrivateKey, PublicKey};

use crate::config::{DeviceConfig, PeerConfig, PeerInfo};
use crate::device::WgDevice;
use crate::error::{KeyRejection, ReconcileError, Result};

/// A client that should be reachable through the interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredPeer {
	pub public_key: String,
	pub allowed_ip: IpAddr,
}

impl DesiredPeer {
	pub fn new(public_key: impl Into<String>, allowed_ip: IpAddr) -> Self {
		Self {
			public_key: public_key.into(),
			allowed_ip,
		}
	}
}

/// Outcome of a push: how many peers reached the device and which keys were
/// skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
	pub applied: usize,
	pub rejected: Vec<KeyRejection>,
}

impl SyncReport {
	pub fn is_complete(&self) -> bool {
		self.rejected.is_empty()
	}

	/// `Ok(applied)` when every key was accepted, otherwise [`ReconcileError::Partial`].
	pub fn into_result(self) -> Result<usize> {
		if self.rejected.is_empty() {
			Ok(self.applied)
		} else {
			Err(ReconcileError::Partial {
				applied: self.applied,
				rejected: self.rejected,
			})
		}
	}
}

fn decode(text: &str, rejected: &mut Vec<KeyRejection>) -> Option<PublicKey> {
	match PublicKey::from_base64(text) {
		Ok(key) => Some(key),
		Err(error) => {
			warn!(public_key = %text, %error, "skipping peer with undecodable key");
			rejected.push(KeyRejection {
				public_key: text.to_string(),
				error,
			});
			None
		}
	}
}

fn upserts(peers: &[DesiredPeer]) -> (Vec<PeerConfig>, Vec<KeyRejection>) {
	let mut rejected = Vec::new();
	let configs = peers
		.iter()
		.filter_map(|peer| {
			decode(&peer.public_key, &mut rejected)
				.map(|key| PeerConfig::upsert(key, vec![host_net(peer.allowed_ip)]))
		})
		.collect();
	(configs, rejected)
}

fn removals(public_keys: &[String]) -> (Vec<PeerConfig>, Vec<KeyRejection>) {
	let mut rejected = Vec::new();
	let configs = public_keys
		.iter()
		.filter_map(|text| decode(text, &mut rejected).map(PeerConfig::remove))
		.collect();
	(configs, rejected)
}

pub struct Reconciler {
	device: Arc<dyn WgDevice>,
	interface: String,
	private_key: PrivateKey,
	listen_port: u16,
}

impl Reconciler {
	pub fn new(
		device: Arc<dyn WgDevice>,
		interface: impl Into<String>,
		private_key: PrivateKey,
		listen_port: u16,
	) -> Self {
		Self {
			device,
			interface: interface.into(),
			private_key,
			listen_port,
		}
	}

	pub fn interface(&self) -> &str {
		&self.interface
	}

	fn device_config(&self, replace_peers: bool, peers: Vec<PeerConfig>) -> DeviceConfig {
		DeviceConfig {
			private_key: Some(self.private_key.clone()),
			listen_port: Some(self.listen_port),
			replace_peers,
			peers,
		}
	}

	/// Replaces the interface's whole peer table with `peers`.
	///
	/// The push happens even when every key is rejected, leaving the
	/// interface with no peers.
	#[instrument(skip(self, peers), fields(interface = %self.interface, desired = peers.len()))]
	pub async fn full_sync(&self, peers: &[DesiredPeer]) -> Result<SyncReport> {
		let (configs, rejected) = upserts(peers);
		let applied = configs.len();

		self
			.device
			.configure(&self.interface, self.device_config(true, configs))
			.await?;

		info!(applied, rejected = rejected.len(), "replaced interface peer table");
		Ok(SyncReport { applied, rejected })
	}

	#[instrument(skip(self, peers), fields(interface = %self.interface, count = peers.len()))]
	pub async fn add_peers(&self, peers: &[DesiredPeer]) -> Result<SyncReport> {
		let (configs, rejected) = upserts(peers);
		let applied = configs.len();

		if applied > 0 {
			self
				.device
				.configure(&self.interface, self.device_config(false, configs))
				.await?;
		}

		debug!(applied, rejected = rejected.len(), "added peers");
		Ok(SyncReport { applied, rejected })
	}

	#[instrument(skip(self, public_keys), fields(interface = %self.interface, count = public_keys.len()))]
	pub async fn remove_peers(&self, public_keys: &[String]) -> Result<SyncReport> {
		let (configs, rejected) = removals(public_keys);
		let applied = configs.len();

		if applied > 0 {
			self
				.device
				.configure(&self.interface, self.device_config(false, configs))
				.await?;
		}

		debug!(applied, rejected = rejected.len(), "removed peers");
		Ok(SyncReport { applied, rejected })
	}

	pub async fn live_peers(&self) -> Result<Vec<PeerInfo>> {
		let info = self.device.device(&self.interface).await?;
		Ok(info.peers)
	}
}

impl std::fmt::Debug for Reconciler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Reconciler")
			.field("interface", &self.interface)
			.field("listen_port", &self.listen_port)
			.finish_non_exhaustive()
	}
}
