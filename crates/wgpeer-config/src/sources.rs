// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources with precedence ordering.

use std::path::PathBuf;
use tracing::debug;

use crate::error::ConfigError;
use crate::layer::DaemonConfigLayer;
use crate::sections::{
	LogFormat, LoggingConfigLayer, StorageConfigLayer, WgBackend, WireguardConfigLayer,
};

pub const SYSTEM_CONFIG_PATH: &str = "/etc/wgpeer/daemon.toml";

/// Higher values override lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<DaemonConfigLayer, ConfigError>;
}

pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<DaemonConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(DaemonConfigLayer::default())
	}
}

/// TOML file source. A missing file contributes nothing.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(SYSTEM_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<DaemonConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(DaemonConfigLayer::default());
		}

		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})
	}
}

/// Reads `WGPEER_*` environment variables.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<DaemonConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(DaemonConfigLayer {
			wireguard: Some(load_wireguard_from_env()?),
			storage: Some(StorageConfigLayer {
				path: env_var("WGPEER_STORAGE_PATH").map(PathBuf::from),
			}),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn load_wireguard_from_env() -> Result<WireguardConfigLayer, ConfigError> {
	Ok(WireguardConfigLayer {
		interface: env_var("WGPEER_WG_INTERFACE"),
		listen_port: env_u16("WGPEER_WG_LISTEN_PORT")?,
		backend: env_parse::<WgBackend>("WGPEER_WG_BACKEND")?,
		address: env_var("WGPEER_WG_ADDRESS"),
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	Ok(LoggingConfigLayer {
		level: env_var("WGPEER_LOG_LEVEL"),
		format: env_parse::<LogFormat>("WGPEER_LOG_FORMAT")?,
	})
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	match env_var(name) {
		Some(v) => v
			.parse()
			.map(Some)
			.map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid u16 value '{v}'"),
			}),
		None => Ok(None),
	}
}

fn env_parse<T>(name: &str) -> Result<Option<T>, ConfigError>
where
	T: std::str::FromStr<Err = String>,
{
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|message| ConfigError::InvalidValue {
			key: name.to_string(),
			message,
		}),
		None => Ok(None),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;
	use tempfile::NamedTempFile;

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Defaults < Precedence::ConfigFile);
		assert!(Precedence::ConfigFile < Precedence::Environment);
	}

	#[test]
	fn test_defaults_source_is_empty() {
		let layer = DefaultsSource.load().unwrap();
		assert!(layer.wireguard.is_none());
		assert!(layer.storage.is_none());
	}

	#[test]
	fn test_toml_source_missing_file() {
		let source = TomlSource::new("/nonexistent/wgpeer/daemon.toml");
		let layer = source.load().unwrap();
		assert!(layer.wireguard.is_none());
	}

	#[test]
	fn test_toml_source_reads_file() {
		let mut file = NamedTempFile::new().unwrap();
		writeln!(
			file,
			r#"
			[wireguard]
			interface = "wg7"
			backend = "userspace"

			[storage]
			path = "/var/lib/wgpeer/conf.json"
			"#
		)
		.unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		let wireguard = layer.wireguard.unwrap();
		assert_eq!(wireguard.interface.as_deref(), Some("wg7"));
		assert_eq!(wireguard.backend, Some(WgBackend::Userspace));
		assert_eq!(
			layer.storage.unwrap().path,
			Some(PathBuf::from("/var/lib/wgpeer/conf.json"))
		);
	}

	#[test]
	fn test_toml_source_parse_error() {
		let mut file = NamedTempFile::new().unwrap();
		writeln!(file, "[wireguard\nlisten_port = ").unwrap();

		let err = TomlSource::new(file.path()).load().unwrap_err();
		assert!(matches!(err, ConfigError::TomlParse { .. }));
	}

	#[test]
	fn test_env_helpers() {
		std::env::set_var("WGPEER_TEST_PORT_OK", "51821");
		std::env::set_var("WGPEER_TEST_PORT_BAD", "not-a-port");
		std::env::set_var("WGPEER_TEST_EMPTY", "");
		std::env::set_var("WGPEER_TEST_FORMAT", "json");

		assert_eq!(env_u16("WGPEER_TEST_PORT_OK").unwrap(), Some(51821));
		assert!(matches!(
			env_u16("WGPEER_TEST_PORT_BAD"),
			Err(ConfigError::InvalidValue { .. })
		));
		assert_eq!(env_var("WGPEER_TEST_EMPTY"), None);
		assert_eq!(
			env_parse::<LogFormat>("WGPEER_TEST_FORMAT").unwrap(),
			Some(LogFormat::Json)
		);
		assert_eq!(env_parse::<WgBackend>("WGPEER_TEST_UNSET").unwrap(), None);
	}
}
