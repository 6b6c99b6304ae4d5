// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard interface configuration section.

use ipnet::IpNet;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_INTERFACE: &str = "wg0";
pub const DEFAULT_LISTEN_PORT: u16 = 51820;
pub const DEFAULT_ADDRESS: &str = "10.0.0.1/8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WgBackend {
	#[default]
	Kernel,
	Userspace,
}

impl fmt::Display for WgBackend {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			WgBackend::Kernel => write!(f, "kernel"),
			WgBackend::Userspace => write!(f, "userspace"),
		}
	}
}

impl FromStr for WgBackend {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"kernel" => Ok(WgBackend::Kernel),
			"userspace" => Ok(WgBackend::Userspace),
			other => Err(format!("unknown backend '{other}', expected kernel or userspace")),
		}
	}
}

/// WireGuard configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireguardConfig {
	pub interface: String,
	pub listen_port: u16,
	pub backend: WgBackend,
	/// Server tunnel address in CIDR form. Its network is the client pool.
	pub address: IpNet,
}

impl WireguardConfig {
	/// Number of addresses available to clients: the network minus its
	/// network address and the server's own address.
	pub fn client_capacity(&self) -> u128 {
		let host_bits = u32::from(self.address.max_prefix_len() - self.address.prefix_len());
		let size = 1u128.checked_shl(host_bits).unwrap_or(u128::MAX);
		size.saturating_sub(2)
	}
}

/// WireGuard configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireguardConfigLayer {
	#[serde(default)]
	pub interface: Option<String>,
	#[serde(default)]
	pub listen_port: Option<u16>,
	#[serde(default)]
	pub backend: Option<WgBackend>,
	#[serde(default)]
	pub address: Option<String>,
}

impl WireguardConfigLayer {
	pub fn merge(&mut self, other: WireguardConfigLayer) {
		if other.interface.is_some() {
			self.interface = other.interface;
		}
		if other.listen_port.is_some() {
			self.listen_port = other.listen_port;
		}
		if other.backend.is_some() {
			self.backend = other.backend;
		}
		if other.address.is_some() {
			self.address = other.address;
		}
	}

	pub fn finalize(self) -> Result<WireguardConfig, ConfigError> {
		let address = self.address.as_deref().unwrap_or(DEFAULT_ADDRESS);
		let address: IpNet = address
			.parse()
			.map_err(|e| ConfigError::invalid("wireguard.address", format!("'{address}': {e}")))?;

		Ok(WireguardConfig {
			interface: self
				.interface
				.unwrap_or_else(|| DEFAULT_INTERFACE.to_string()),
			listen_port: self.listen_port.unwrap_or(DEFAULT_LISTEN_PORT),
			backend: self.backend.unwrap_or_default(),
			address,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = WireguardConfigLayer::default().finalize().unwrap();
		assert_eq!(config.interface, "wg0");
		assert_eq!(config.listen_port, 51820);
		assert_eq!(config.backend, WgBackend::Kernel);
		assert_eq!(config.address.to_string(), "10.0.0.1/8");
	}

	#[test]
	fn test_merge_overwrites_set_fields_only() {
		let mut base = WireguardConfigLayer {
			interface: Some("wg1".to_string()),
			listen_port: Some(51000),
			..Default::default()
		};
		base.merge(WireguardConfigLayer {
			listen_port: Some(52000),
			backend: Some(WgBackend::Userspace),
			..Default::default()
		});

		let config = base.finalize().unwrap();
		assert_eq!(config.interface, "wg1");
		assert_eq!(config.listen_port, 52000);
		assert_eq!(config.backend, WgBackend::Userspace);
	}

	#[test]
	fn test_invalid_address() {
		let layer = WireguardConfigLayer {
			address: Some("10.0.0.1".to_string()),
			..Default::default()
		};
		let err = layer.finalize().unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "wireguard.address"));
	}

	#[test]
	fn test_deserialize_backend() {
		let layer: WireguardConfigLayer = toml::from_str(r#"backend = "userspace""#).unwrap();
		assert_eq!(layer.backend, Some(WgBackend::Userspace));

		let bad: Result<WireguardConfigLayer, _> = toml::from_str(r#"backend = "boringtun""#);
		assert!(bad.is_err());
	}

	#[test]
	fn test_client_capacity() {
		let layer = WireguardConfigLayer {
			address: Some("10.0.0.1/29".to_string()),
			..Default::default()
		};
		assert_eq!(layer.finalize().unwrap().client_capacity(), 6);

		let host = WireguardConfigLayer {
			address: Some("10.0.0.1/32".to_string()),
			..Default::default()
		};
		assert_eq!(host.finalize().unwrap().client_capacity(), 0);
	}
}
