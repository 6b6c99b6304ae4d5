// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! wgpeerd: keeps a WireGuard interface in step with the stored peer list.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wgpeer_common::KeyPair;
use wgpeer_config::{DaemonConfig, LogFormat, LoggingConfig, WgBackend};
use wgpeer_device::{Backend, KernelDevice};
use wgpeer_server::{Server, ServerSettings};
use wgpeer_store::PeerStore;

#[derive(Parser, Debug)]
#[command(name = "wgpeerd", about = "WireGuard peer-management daemon", version)]
struct Args {
	/// TOML config file (defaults to /etc/wgpeer/daemon.toml)
	#[arg(long, short, env = "WGPEER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
	/// Sync the interface from storage and run until interrupted (default)
	Serve,
	/// Create the storage file with a fresh server key pair
	Init,
	/// Push every enabled peer to the interface
	Sync,
	/// List a user's client configs
	Configs {
		#[arg(long)]
		user: String,
	},
	/// Create a client config; a key pair is generated when no public key is given
	CreateConfig {
		#[arg(long)]
		user: String,
		#[arg(long)]
		name: String,
		#[arg(long)]
		public_key: Option<String>,
	},
	/// Change the name or note of a client config
	UpdateConfig {
		#[arg(long)]
		user: String,
		#[arg(long)]
		public_key: String,
		#[arg(long)]
		name: String,
		#[arg(long)]
		note: Option<String>,
	},
	/// Delete a client config and remove its peer
	DeleteConfig {
		#[arg(long)]
		user: String,
		#[arg(long)]
		public_key: String,
	},
	/// Re-enable a user's peers
	EnableUser {
		#[arg(long)]
		user: String,
	},
	/// Remove a user's peers from the interface, keeping their configs
	DisableUser {
		#[arg(long)]
		user: String,
	},
	/// Show peers with a recent handshake, grouped by user
	Connections,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	let config = load_config(args.config.as_deref())?;
	init_tracing(&config.logging);

	match args.command.unwrap_or(Command::Serve) {
		Command::Init => init(&config).await,
		Command::Serve => serve(&config).await,
		command => run_once(&config, command).await,
	}
}

/// Loads configuration under a scoped stderr subscriber, since the configured
/// level and format are not known until loading finishes.
fn load_config(path: Option<&Path>) -> anyhow::Result<DaemonConfig> {
	let bootstrap = tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
		)
		.with_writer(std::io::stderr)
		.finish();

	tracing::subscriber::with_default(bootstrap, || match path {
		Some(path) => wgpeer_config::load_config_with_file(path),
		None => wgpeer_config::load_config(),
	})
	.context("failed to load configuration")
}

fn init_tracing(logging: &LoggingConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| logging.level.clone().into());

	// stdout carries command output, so logs go to stderr.
	let registry = tracing_subscriber::registry().with(filter);
	match logging.format {
		LogFormat::Pretty => registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.init(),
		LogFormat::Json => registry
			.with(
				tracing_subscriber::fmt::layer()
					.json()
					.with_writer(std::io::stderr),
			)
			.init(),
	}
}

fn device_backend(backend: WgBackend) -> Backend {
	match backend {
		WgBackend::Kernel => Backend::Kernel,
		WgBackend::Userspace => Backend::Userspace,
	}
}

async fn build_server(config: &DaemonConfig, store: PeerStore) -> Server {
	let device = Arc::new(KernelDevice::new(device_backend(config.wireguard.backend)));
	let settings = ServerSettings {
		interface: config.wireguard.interface.clone(),
		listen_port: config.wireguard.listen_port,
		address: config.wireguard.address,
	};
	Server::new(Arc::new(store), device, settings).await
}

async fn init(config: &DaemonConfig) -> anyhow::Result<()> {
	let store = PeerStore::create(&config.storage.path, &KeyPair::generate())
		.await
		.with_context(|| format!("failed to initialise {}", config.storage.path.display()))?;

	print_json(&json!({
		"path": store.path(),
		"serverPublicKey": store.server_public_key().await,
	}))
}

async fn serve(config: &DaemonConfig) -> anyhow::Result<()> {
	let store = PeerStore::open_or_create(&config.storage.path)
		.await
		.with_context(|| format!("failed to open {}", config.storage.path.display()))?;
	let server = build_server(config, store).await;

	tracing::info!(
		interface = %config.wireguard.interface,
		listen_port = config.wireguard.listen_port,
		backend = %config.wireguard.backend,
		address = %config.wireguard.address,
		server_public_key = %server.server_public_key().await,
		"starting wgpeerd"
	);

	// A failed startup sync is not fatal; `wgpeerd sync` retries it.
	match server.sync().await {
		Ok(applied) => tracing::info!(applied, "interface synchronised"),
		Err(e) => tracing::warn!(error = %e, "initial sync failed"),
	}

	tokio::signal::ctrl_c()
		.await
		.context("failed to listen for shutdown signal")?;
	tracing::info!("Received shutdown signal");

	tracing::info!("wgpeerd shutdown complete");
	Ok(())
}

async fn run_once(config: &DaemonConfig, command: Command) -> anyhow::Result<()> {
	let store = PeerStore::open(&config.storage.path)
		.await
		.with_context(|| format!("failed to open {}", config.storage.path.display()))?;
	let server = build_server(config, store).await;

	match command {
		Command::Sync => {
			let applied = server.sync().await?;
			print_json(&json!({ "applied": applied }))
		}
		Command::Configs { user } => print_json(&server.list_configs(&user).await?),
		Command::CreateConfig {
			user,
			name,
			public_key: Some(public_key),
		} => print_json(&server.create_config(&user, &public_key, &name).await?),
		Command::CreateConfig {
			user,
			name,
			public_key: None,
		} => print_json(
			&server
				.create_config_with_generated_key_pair(&user, &name)
				.await?,
		),
		Command::UpdateConfig {
			user,
			public_key,
			name,
			note,
		} => print_json(&server.update_config(&user, &public_key, &name, note).await?),
		Command::DeleteConfig { user, public_key } => {
			server.delete_config(&user, &public_key).await?;
			print_json(&json!({ "deleted": public_key }))
		}
		Command::EnableUser { user } => {
			server.enable_user(&user).await?;
			print_json(&json!({ "user": user, "enabled": true }))
		}
		Command::DisableUser { user } => {
			server.disable_user(&user).await?;
			print_json(&json!({ "user": user, "enabled": false }))
		}
		Command::Connections => print_json(&server.list_connections().await?),
		other @ (Command::Serve | Command::Init) => {
			anyhow::bail!("{other:?} is not a one-shot command")
		}
	}
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_default_command_is_none() {
		let args = Args::try_parse_from(["wgpeerd"]).unwrap();
		assert!(args.command.is_none());
	}

	#[test]
	fn test_parse_create_config() {
		let args = Args::try_parse_from([
			"wgpeerd",
			"--config",
			"/tmp/daemon.toml",
			"create-config",
			"--user",
			"alice",
			"--name",
			"laptop",
		])
		.unwrap();

		assert_eq!(args.config, Some(PathBuf::from("/tmp/daemon.toml")));
		assert_eq!(
			args.command,
			Some(Command::CreateConfig {
				user: "alice".to_string(),
				name: "laptop".to_string(),
				public_key: None,
			})
		);
	}

	#[test]
	fn test_delete_requires_public_key() {
		assert!(Args::try_parse_from(["wgpeerd", "delete-config", "--user", "alice"]).is_err());
	}

	#[test]
	fn test_load_config_leaves_global_subscriber_unset() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, "[wireguard]\ninterface = \"wg5\"\n").unwrap();

		let config = load_config(Some(file.path())).unwrap();
		assert_eq!(config.wireguard.interface, "wg5");

		// The bootstrap subscriber is scoped, so the real one can still be installed.
		assert!(tracing_subscriber::registry().try_init().is_ok());
	}

	#[test]
	fn test_load_config_reports_bad_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, "[wireguard\n").unwrap();

		let err = load_config(Some(file.path())).unwrap_err();
		assert!(err.to_string().contains("failed to load configuration"));
	}

	#[test]
	fn test_backend_mapping() {
		assert_eq!(device_backend(WgBackend::Kernel), Backend::Kernel);
		assert_eq!(device_backend(WgBackend::Userspace), Backend::Userspace);
	}
}
