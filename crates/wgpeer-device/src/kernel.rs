// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! [`WgDevice`] backed by `wireguard-control`.
//!
//! The kernel backend talks netlink and is Linux only; the userspace backend
//! speaks the cross-platform UAPI socket protocol. Both are blocking, so every
//! call is moved onto the blocking thread pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ipnet::IpNet;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};
use wgpeer_common::PublicKey;
use wireguard_control::{DeviceUpdate, InterfaceName, Key, PeerConfigBuilder};

use crate::config::{Backend, DeviceConfig, DeviceInfo, PeerInfo};
use crate::device::WgDevice;
use crate::error::DeviceError;

#[derive(Debug, Clone, Copy, Default)]
pub struct KernelDevice {
	backend: Backend,
}

impl KernelDevice {
	pub fn new(backend: Backend) -> Self {
		Self { backend }
	}

	pub fn backend(&self) -> Backend {
		self.backend
	}

	fn control_backend(&self) -> Result<wireguard_control::Backend, DeviceError> {
		match self.backend {
			#[cfg(target_os = "linux")]
			Backend::Kernel => Ok(wireguard_control::Backend::Kernel),
			#[cfg(not(target_os = "linux"))]
			Backend::Kernel => Err(DeviceError::UnsupportedBackend("kernel")),
			Backend::Userspace => Ok(wireguard_control::Backend::Userspace),
		}
	}
}

fn interface_name(interface: &str) -> Result<InterfaceName, DeviceError> {
	interface
		.parse::<InterfaceName>()
		.map_err(|_| DeviceError::InvalidInterfaceName(interface.to_string()))
}

fn to_control_key(encoded: &str) -> Result<Key, DeviceError> {
	Key::from_base64(encoded).map_err(|_| DeviceError::InvalidKey("not a base64 WireGuard key".to_string()))
}

fn from_control_key(key: &Key) -> Result<PublicKey, DeviceError> {
	PublicKey::from_base64(&key.to_base64()).map_err(|e| DeviceError::InvalidKey(e.to_string()))
}

fn handshake_time(time: Option<SystemTime>) -> Option<DateTime<Utc>> {
	time.filter(|t| *t > UNIX_EPOCH).map(DateTime::<Utc>::from)
}

fn build_update(config: &DeviceConfig) -> Result<DeviceUpdate, DeviceError> {
	let mut update = DeviceUpdate::new();

	if let Some(private_key) = &config.private_key {
		update = update.set_private_key(to_control_key(&private_key.to_base64())?);
	}
	if let Some(port) = config.listen_port {
		update = update.set_listen_port(port);
	}
	if config.replace_peers {
		update = update.replace_peers();
	}

	let mut builders = Vec::with_capacity(config.peers.len());
	for peer in &config.peers {
		let key = to_control_key(&peer.public_key.to_base64())?;
		if peer.remove {
			update = update.remove_peer_by_key(&key);
			continue;
		}

		let mut builder = PeerConfigBuilder::new(&key);
		if peer.replace_allowed_ips {
			builder = builder.replace_allowed_ips();
		}
		for net in &peer.allowed_ips {
			builder = builder.add_allowed_ip(net.addr(), net.prefix_len());
		}
		builders.push(builder);
	}

	Ok(update.add_peers(&builders))
}

fn read_device(
	interface: String,
	name: &InterfaceName,
	backend: wireguard_control::Backend,
) -> Result<DeviceInfo, DeviceError> {
	let device = wireguard_control::Device::get(name, backend)
		.map_err(|source| DeviceError::Io { interface, source })?;

	let public_key = device.public_key.as_ref().map(from_control_key).transpose()?;

	let mut peers = Vec::with_capacity(device.peers.len());
	for peer in &device.peers {
		let allowed_ips = peer
			.config
			.allowed_ips
			.iter()
			.filter_map(|ip| IpNet::new(ip.address, ip.cidr).ok())
			.collect();

		peers.push(PeerInfo {
			public_key: from_control_key(&peer.config.public_key)?,
			allowed_ips,
			last_handshake: handshake_time(peer.stats.last_handshake_time),
			rx_bytes: peer.stats.rx_bytes,
			tx_bytes: peer.stats.tx_bytes,
		});
	}

	Ok(DeviceInfo {
		public_key,
		listen_port: device.listen_port,
		peers,
	})
}

#[async_trait]
impl WgDevice for KernelDevice {
	#[instrument(skip(self, config), fields(backend = %self.backend, peers = config.peers.len(), replace = config.replace_peers))]
	async fn configure(&self, interface: &str, config: DeviceConfig) -> Result<(), DeviceError> {
		let name = interface_name(interface)?;
		let backend = self.control_backend()?;
		let update = build_update(&config)?;

		tokio::task::spawn_blocking(move || update.apply(&name, backend))
			.await
			.map_err(|e| DeviceError::Task(e.to_string()))?
			.map_err(|source| DeviceError::Io {
				interface: interface.to_string(),
				source,
			})?;

		debug!("applied device update");
		Ok(())
	}

	#[instrument(skip(self), fields(backend = %self.backend))]
	async fn device(&self, interface: &str) -> Result<DeviceInfo, DeviceError> {
		let name = interface_name(interface)?;
		let backend = self.control_backend()?;

		let owned = interface.to_string();
		let info = tokio::task::spawn_blocking(move || read_device(owned, &name, backend))
			.await
			.map_err(|e| DeviceError::Task(e.to_string()))??;

		debug!(peers = info.peers.len(), "read device state");
		Ok(info)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::PeerConfig;
	use std::time::Duration;
	use wgpeer_common::KeyPair;

	#[test]
	fn rejects_invalid_interface_name() {
		let result = interface_name("this-name-is-far-too-long-for-linux");
		assert!(matches!(result, Err(DeviceError::InvalidInterfaceName(_))));
	}

	#[test]
	fn key_conversion_preserves_bytes() {
		let key = *KeyPair::generate().public_key();
		let control = to_control_key(&key.to_base64()).unwrap();
		assert_eq!(from_control_key(&control).unwrap(), key);
	}

	#[test]
	fn zero_handshake_means_never() {
		assert_eq!(handshake_time(None), None);
		assert_eq!(handshake_time(Some(UNIX_EPOCH)), None);

		let later = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
		assert_eq!(
			handshake_time(Some(later)).unwrap().timestamp(),
			1_700_000_000
		);
	}

	#[test]
	fn build_update_accepts_mixed_peers() {
		let keypair = KeyPair::generate();
		let config = DeviceConfig {
			private_key: Some(keypair.private_key().clone()),
			listen_port: Some(51820),
			replace_peers: true,
			peers: vec![
				PeerConfig::upsert(
					*KeyPair::generate().public_key(),
					vec!["10.0.0.2/32".parse().unwrap()],
				),
				PeerConfig::remove(*KeyPair::generate().public_key()),
			],
		};
		assert!(build_update(&config).is_ok());
	}

	#[cfg(not(target_os = "linux"))]
	#[test]
	fn kernel_backend_unsupported_off_linux() {
		let device = KernelDevice::new(Backend::Kernel);
		assert!(matches!(
			device.control_backend(),
			Err(DeviceError::UnsupportedBackend("kernel"))
		));
	}
}
