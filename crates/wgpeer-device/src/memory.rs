// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use wgpeer_common::{PrivateKey, PublicKey};

use crate::config::{DeviceConfig, DeviceInfo, PeerInfo};
use crate::device::WgDevice;
use crate::error::DeviceError;

#[derive(Debug, Default, Clone)]
struct MemoryPeer {
	allowed_ips: Vec<IpNet>,
	last_handshake: Option<DateTime<Utc>>,
	rx_bytes: u64,
	tx_bytes: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
	private_key: Option<PrivateKey>,
	listen_port: Option<u16>,
	peers: BTreeMap<PublicKey, MemoryPeer>,
	fail_next: Option<String>,
	configure_calls: Vec<DeviceConfig>,
}

impl MemoryState {
	fn take_failure(&mut self) -> Result<(), DeviceError> {
		match self.fail_next.take() {
			Some(message) => Err(DeviceError::Unavailable(message)),
			None => Ok(()),
		}
	}

	/// An allowed IP belongs to at most one peer; assigning it moves it.
	fn claim_allowed_ips(&mut self, owner: &PublicKey, nets: &[IpNet]) {
		for (key, peer) in self.peers.iter_mut() {
			if key != owner {
				peer.allowed_ips.retain(|net| !nets.contains(net));
			}
		}
	}

	fn apply(&mut self, config: &DeviceConfig) {
		if let Some(private_key) = &config.private_key {
			self.private_key = Some(private_key.clone());
		}
		if let Some(port) = config.listen_port {
			self.listen_port = Some(port);
		}
		if config.replace_peers {
			self.peers.clear();
		}

		for peer in &config.peers {
			if peer.remove {
				self.peers.remove(&peer.public_key);
				continue;
			}

			self.claim_allowed_ips(&peer.public_key, &peer.allowed_ips);
			let entry = self.peers.entry(peer.public_key).or_default();
			if peer.replace_allowed_ips {
				entry.allowed_ips.clear();
			}
			for net in &peer.allowed_ips {
				if !entry.allowed_ips.contains(net) {
					entry.allowed_ips.push(*net);
				}
			}
		}
	}

	fn peer_info(key: &PublicKey, peer: &MemoryPeer) -> PeerInfo {
		PeerInfo {
			public_key: *key,
			allowed_ips: peer.allowed_ips.clone(),
			last_handshake: peer.last_handshake,
			rx_bytes: peer.rx_bytes,
			tx_bytes: peer.tx_bytes,
		}
	}
}

/// In-process [`WgDevice`] with WireGuard's configure semantics.
///
/// Serves a single named interface. Test code can set handshake times,
/// plant peers the daemon never configured, and make the next call fail.
#[derive(Debug)]
pub struct MemoryDevice {
	interface: String,
	state: Mutex<MemoryState>,
}

impl MemoryDevice {
	pub fn new(interface: impl Into<String>) -> Self {
		Self {
			interface: interface.into(),
			state: Mutex::new(MemoryState::default()),
		}
	}

	pub fn interface(&self) -> &str {
		&self.interface
	}

	fn lock(&self) -> MutexGuard<'_, MemoryState> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	fn check_interface(&self, interface: &str) -> Result<(), DeviceError> {
		if interface == self.interface {
			Ok(())
		} else {
			Err(DeviceError::NoSuchInterface(interface.to_string()))
		}
	}

	/// Makes the next `configure` or `device` call fail with `message`.
	pub fn fail_next(&self, message: impl Into<String>) {
		self.lock().fail_next = Some(message.into());
	}

	/// Returns `false` if the peer is not on the interface.
	pub fn set_handshake(&self, public_key: &PublicKey, at: DateTime<Utc>) -> bool {
		match self.lock().peers.get_mut(public_key) {
			Some(peer) => {
				peer.last_handshake = Some(at);
				true
			}
			None => false,
		}
	}

	pub fn set_transfer(&self, public_key: &PublicKey, rx_bytes: u64, tx_bytes: u64) -> bool {
		match self.lock().peers.get_mut(public_key) {
			Some(peer) => {
				peer.rx_bytes = rx_bytes;
				peer.tx_bytes = tx_bytes;
				true
			}
			None => false,
		}
	}

	/// Adds a peer directly, bypassing `configure`, as if another tool had
	/// configured the interface.
	pub fn insert_peer(&self, public_key: PublicKey, allowed_ips: Vec<IpNet>) {
		self.lock().peers.insert(
			public_key,
			MemoryPeer {
				allowed_ips,
				..MemoryPeer::default()
			},
		);
	}

	pub fn peers(&self) -> Vec<PeerInfo> {
		self
			.lock()
			.peers
			.iter()
			.map(|(key, peer)| MemoryState::peer_info(key, peer))
			.collect()
	}

	pub fn peer(&self, public_key: &PublicKey) -> Option<PeerInfo> {
		self
			.lock()
			.peers
			.get(public_key)
			.map(|peer| MemoryState::peer_info(public_key, peer))
	}

	pub fn private_key(&self) -> Option<PrivateKey> {
		self.lock().private_key.clone()
	}

	pub fn listen_port(&self) -> Option<u16> {
		self.lock().listen_port
	}

	/// Every successful `configure` call, oldest first.
	pub fn configure_calls(&self) -> Vec<DeviceConfig> {
		self.lock().configure_calls.clone()
	}
}

#[async_trait]
impl WgDevice for MemoryDevice {
	async fn configure(&self, interface: &str, config: DeviceConfig) -> Result<(), DeviceError> {
		self.check_interface(interface)?;
		let mut state = self.lock();
		state.take_failure()?;

		state.apply(&config);
		debug!(
			interface,
			peers = state.peers.len(),
			replace = config.replace_peers,
			"applied in-memory device update"
		);
		state.configure_calls.push(config);
		Ok(())
	}

	async fn device(&self, interface: &str) -> Result<DeviceInfo, DeviceError> {
		self.check_interface(interface)?;
		let mut state = self.lock();
		state.take_failure()?;

		Ok(DeviceInfo {
			public_key: state.private_key.as_ref().map(PrivateKey::public_key),
			listen_port: state.listen_port,
			peers: state
				.peers
				.iter()
				.map(|(key, peer)| MemoryState::peer_info(key, peer))
				.collect(),
		})
	}
}
