// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration management for the wgpeer daemon.
//!
//! This crate provides:
//! - Layered configuration from defaults, a TOML file and environment variables
//! - Precedence-based merging (later sources override earlier ones)
//! - Validation of the tunnel address before the daemon touches the interface
//!
//! # Example
//!
//! ```ignore
//! use wgpeer_config::load_config;
//!
//! let config = load_config()?;
//! println!("managing {} on port {}", config.wireguard.interface, config.wireguard.listen_port);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::DaemonConfigLayer;
pub use sections::*;
pub use sources::{
	ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource, SYSTEM_CONFIG_PATH,
};

use std::path::Path;
use tracing::{debug, info};

/// Fully resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
	pub wireguard: WireguardConfig,
	pub storage: StorageConfig,
	pub logging: LoggingConfig,
}

/// Loads configuration from defaults, `/etc/wgpeer/daemon.toml` and the
/// environment.
pub fn load_config() -> Result<DaemonConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Like [`load_config`] but reads the TOML file from `path`.
pub fn load_config_with_file(path: impl AsRef<Path>) -> Result<DaemonConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(path.as_ref())),
		Box::new(EnvSource),
	])
}

/// Defaults overridden by environment variables only.
pub fn load_config_from_env() -> Result<DaemonConfig, ConfigError> {
	load_from_sources(vec![Box::new(DefaultsSource), Box::new(EnvSource)])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<DaemonConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = DaemonConfigLayer::default();
	for source in &sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

fn finalize(layer: DaemonConfigLayer) -> Result<DaemonConfig, ConfigError> {
	let config = DaemonConfig {
		wireguard: layer.wireguard.unwrap_or_default().finalize()?,
		storage: layer.storage.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		interface = %config.wireguard.interface,
		listen_port = config.wireguard.listen_port,
		backend = %config.wireguard.backend,
		address = %config.wireguard.address,
		storage = %config.storage.path.display(),
		"Daemon configuration loaded"
	);

	Ok(config)
}

fn validate_config(config: &DaemonConfig) -> Result<(), ConfigError> {
	if config.wireguard.interface.is_empty() {
		return Err(ConfigError::Validation(
			"wireguard.interface must not be empty".to_string(),
		));
	}

	if config.wireguard.listen_port == 0 {
		return Err(ConfigError::Validation(
			"wireguard.listen_port must be between 1 and 65535".to_string(),
		));
	}

	let address = config.wireguard.address;
	if address.addr() == address.network() {
		return Err(ConfigError::Validation(format!(
			"wireguard.address {address} is the network address, use a host address such as {}/{}",
			address.hosts().next().unwrap_or(address.addr()),
			address.prefix_len()
		)));
	}

	if config.wireguard.client_capacity() == 0 {
		return Err(ConfigError::Validation(format!(
			"wireguard.address {address} leaves no room for client addresses"
		)));
	}

	if config.storage.path.as_os_str().is_empty() {
		return Err(ConfigError::Validation(
			"storage.path must not be empty".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	fn load_file(content: &str) -> Result<DaemonConfig, ConfigError> {
		let mut file = NamedTempFile::new().unwrap();
		write!(file, "{content}").unwrap();
		load_from_sources(vec![
			Box::new(DefaultsSource),
			Box::new(TomlSource::new(file.path())),
		])
	}

	#[test]
	fn test_defaults() {
		let config = load_from_sources(vec![Box::new(DefaultsSource)]).unwrap();
		assert_eq!(config.wireguard.interface, "wg0");
		assert_eq!(config.wireguard.listen_port, 51820);
		assert_eq!(config.wireguard.address.to_string(), "10.0.0.1/8");
		assert_eq!(config.storage, StorageConfig::default());
		assert_eq!(config.logging, LoggingConfig::default());
	}

	#[test]
	fn test_file_overrides_defaults() {
		let config = load_file(
			r#"
			[wireguard]
			interface = "wg9"
			address = "172.16.0.1/24"

			[logging]
			level = "debug"
			"#,
		)
		.unwrap();

		assert_eq!(config.wireguard.interface, "wg9");
		assert_eq!(config.wireguard.listen_port, 51820);
		assert_eq!(config.wireguard.address.to_string(), "172.16.0.1/24");
		assert_eq!(config.logging.level, "debug");
	}

	#[test]
	fn test_sources_apply_in_precedence_order() {
		let mut low = NamedTempFile::new().unwrap();
		write!(low, "[wireguard]\nlisten_port = 1000\n").unwrap();

		struct Override;
		impl ConfigSource for Override {
			fn name(&self) -> &'static str {
				"override"
			}
			fn precedence(&self) -> Precedence {
				Precedence::Environment
			}
			fn load(&self) -> Result<DaemonConfigLayer, ConfigError> {
				Ok(DaemonConfigLayer {
					wireguard: Some(WireguardConfigLayer {
						listen_port: Some(2000),
						..Default::default()
					}),
					..Default::default()
				})
			}
		}

		// Listed out of order on purpose.
		let config = load_from_sources(vec![
			Box::new(Override),
			Box::new(TomlSource::new(low.path())),
			Box::new(DefaultsSource),
		])
		.unwrap();
		assert_eq!(config.wireguard.listen_port, 2000);
	}

	#[test]
	fn test_rejects_network_address() {
		let err = load_file("[wireguard]\naddress = \"10.0.0.0/8\"\n").unwrap_err();
		assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("10.0.0.1/8")));
	}

	#[test]
	fn test_rejects_pool_without_clients() {
		for address in ["10.0.0.1/32", "10.0.0.1/31", "fd00::1/127"] {
			let err = load_file(&format!("[wireguard]\naddress = \"{address}\"\n")).unwrap_err();
			assert!(matches!(err, ConfigError::Validation(_)), "{address}");
		}
	}

	#[test]
	fn test_accepts_smallest_usable_pool() {
		let config = load_file("[wireguard]\naddress = \"10.0.0.1/30\"\n").unwrap();
		assert_eq!(config.wireguard.client_capacity(), 2);
	}

	#[test]
	fn test_rejects_zero_port() {
		let err = load_file("[wireguard]\nlisten_port = 0\n").unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}
}
