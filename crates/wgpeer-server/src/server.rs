// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::IpNet;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use wgpeer_common::{ClientConfig, KeyPair, PrivateKey, PublicKey, Timestamp, UserId};
use wgpeer_device::{DesiredPeer, Reconciler, WgDevice};
use wgpeer_store::PeerStore;

use crate::allocator::IpAllocator;
use crate::connections::{ConnectionMonitor, Connections};
use crate::error::{AllocError, ConflictKind, Result, ServerError};

/// Upper bound on allocate-then-store rounds for a single create.
pub const MAX_ALLOCATION_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
	pub interface: String,
	pub listen_port: u16,
	/// Server tunnel address; its network is the client pool.
	pub address: IpNet,
}

/// One round of the allocate-then-store loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationOutcome {
	Allocated(IpAddr),
	/// The address was taken between allocation and store.
	Retry(IpAddr),
	Exhausted(AllocError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedConfig {
	pub ip: IpAddr,
	pub server_public_key: PublicKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedConfig {
	pub client_private_key: PrivateKey,
	pub ip: IpAddr,
	pub server_public_key: PublicKey,
}

/// Peer-management facade.
///
/// Writes hold `mutation` from the store change through the kernel push, so
/// the interface never receives a peer set older than what is on disk. If the
/// push fails, the stored change is kept and the error is returned; the next
/// write or [`Server::sync`] brings the interface back in line.
pub struct Server {
	store: Arc<PeerStore>,
	reconciler: Arc<Reconciler>,
	allocator: IpAllocator,
	monitor: ConnectionMonitor,
	mutation: Mutex<()>,
}

fn parse_user(user_id: &str) -> Result<UserId> {
	let trimmed = user_id.trim();
	if trimmed.is_empty() {
		return Err(ServerError::MalformedInput("user id is empty".to_string()));
	}
	Ok(UserId::new(trimmed))
}

fn parse_public_key(public_key: &str) -> Result<PublicKey> {
	PublicKey::from_base64(public_key)
		.map_err(|e| ServerError::MalformedInput(format!("invalid public key '{public_key}': {e}")))
}

fn require_name(name: &str) -> Result<&str> {
	if name.trim().is_empty() {
		return Err(ServerError::MalformedInput("config name is empty".to_string()));
	}
	Ok(name)
}

impl Server {
	pub async fn new(store: Arc<PeerStore>, device: Arc<dyn WgDevice>, settings: ServerSettings) -> Self {
		let reconciler = Arc::new(Reconciler::new(
			device,
			settings.interface,
			store.server_private_key().await,
			settings.listen_port,
		));

		Self {
			monitor: ConnectionMonitor::new(store.clone(), reconciler.clone()),
			allocator: IpAllocator::new(settings.address),
			store,
			reconciler,
			mutation: Mutex::new(()),
		}
	}

	pub fn store(&self) -> &Arc<PeerStore> {
		&self.store
	}

	pub fn allocator(&self) -> &IpAllocator {
		&self.allocator
	}

	pub fn monitor(&self) -> &ConnectionMonitor {
		&self.monitor
	}

	pub async fn server_public_key(&self) -> PublicKey {
		self.store.server_public_key().await
	}

	pub async fn list_configs(&self, user_id: &str) -> Result<HashMap<PublicKey, ClientConfig>> {
		let user_id = parse_user(user_id)?;
		Ok(self.store.get_clients(&user_id).await)
	}

	pub async fn list_connections(&self) -> Result<Connections> {
		self.monitor.connections().await
	}

	/// Registers `public_key` for `user_id` and pushes it to the interface.
	///
	/// Re-creating a key the user already owns keeps its address and only
	/// refreshes the name. A disabled user's config is stored but stays off
	/// the interface until the user is enabled.
	#[instrument(skip(self), fields(user = %user_id))]
	pub async fn create_config(&self, user_id: &str, public_key: &str, name: &str) -> Result<CreatedConfig> {
		let user_id = parse_user(user_id)?;
		let public_key = parse_public_key(public_key)?;
		let name = require_name(name)?;

		let _guard = self.mutation.lock().await;
		let ip = self.store_config(&user_id, &public_key, name).await?;

		let enabled = self
			.store
			.get_user(&user_id)
			.await
			.is_some_and(|user| user.is_enabled());
		if enabled {
			self
				.reconciler
				.add_peers(&[DesiredPeer::new(public_key.to_base64(), ip)])
				.await?
				.into_result()?;
		} else {
			debug!("user is disabled, config not pushed");
		}

		info!(%public_key, %ip, "created config");
		Ok(CreatedConfig {
			ip,
			server_public_key: self.store.server_public_key().await,
		})
	}

	/// Like [`Server::create_config`], with a key pair generated for the client.
	pub async fn create_config_with_generated_key_pair(
		&self,
		user_id: &str,
		name: &str,
	) -> Result<GeneratedConfig> {
		let keypair = KeyPair::generate();
		let created = self
			.create_config(user_id, &keypair.public_key().to_base64(), name)
			.await?;

		Ok(GeneratedConfig {
			client_private_key: keypair.private_key().clone(),
			ip: created.ip,
			server_public_key: created.server_public_key,
		})
	}

	async fn store_config(&self, user_id: &UserId, public_key: &PublicKey, name: &str) -> Result<IpAddr> {
		if let Some((owner, existing)) = self.store.find_owner(public_key).await {
			if &owner != user_id {
				return Err(ServerError::Conflict(ConflictKind::PublicKeyInUse {
					public_key: *public_key,
					owner,
				}));
			}

			let refreshed = ClientConfig {
				name: name.to_string(),
				modified: Timestamp::now(),
				..existing
			};
			if self
				.store
				.update_or_create_config(user_id, public_key, refreshed)
				.await?
			{
				debug!(ip = %existing.ip, "re-created existing config");
				return Ok(existing.ip);
			}
		}

		// `mutation` serializes creates made through the facade, but the store
		// can still be written directly, so its write-time IP check decides.
		for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
			let allocated = self.store.allocated_ips().await;
			match self.try_allocate(&allocated, user_id, public_key, name).await? {
				AllocationOutcome::Allocated(ip) => return Ok(ip),
				AllocationOutcome::Retry(ip) => {
					warn!(%ip, attempt, "allocated address was taken before store, retrying");
				}
				AllocationOutcome::Exhausted(err) => {
					warn!(pool = %self.allocator.pool(), "address pool exhausted");
					return Err(err.into());
				}
			}
		}

		Err(ServerError::Conflict(ConflictKind::AllocationContention {
			attempts: MAX_ALLOCATION_ATTEMPTS,
		}))
	}

	async fn try_allocate(
		&self,
		allocated: &HashSet<IpAddr>,
		user_id: &UserId,
		public_key: &PublicKey,
		name: &str,
	) -> Result<AllocationOutcome> {
		let ip = match self.allocator.allocate(allocated) {
			Ok(ip) => ip,
			Err(err) => return Ok(AllocationOutcome::Exhausted(err)),
		};

		let stored = self
			.store
			.update_or_create_config(user_id, public_key, ClientConfig::new(name, ip))
			.await?;

		Ok(if stored {
			AllocationOutcome::Allocated(ip)
		} else {
			AllocationOutcome::Retry(ip)
		})
	}

	/// Edits the display name and note of an existing config. The address is
	/// unchanged, so the interface is not touched.
	#[instrument(skip(self, note), fields(user = %user_id))]
	pub async fn update_config(
		&self,
		user_id: &str,
		public_key: &str,
		name: &str,
		note: Option<String>,
	) -> Result<ClientConfig> {
		let user_id = parse_user(user_id)?;
		let public_key = parse_public_key(public_key)?;
		let name = require_name(name)?;

		let _guard = self.mutation.lock().await;
		let existing = self
			.store
			.get_clients(&user_id)
			.await
			.remove(&public_key)
			.ok_or_else(|| ServerError::NotFound {
				user: user_id.clone(),
				public_key,
			})?;

		let updated = ClientConfig {
			name: name.to_string(),
			note,
			modified: Timestamp::now(),
			..existing
		};
		if !self
			.store
			.update_or_create_config(&user_id, &public_key, updated.clone())
			.await?
		{
			warn!(ip = %updated.ip, "stored address is held by another config");
			return Err(ServerError::Conflict(ConflictKind::AddressInUse(updated.ip)));
		}

		info!(%public_key, "updated config");
		Ok(updated)
	}

	#[instrument(skip(self), fields(user = %user_id))]
	pub async fn delete_config(&self, user_id: &str, public_key: &str) -> Result<()> {
		let user_id = parse_user(user_id)?;
		let public_key = parse_public_key(public_key)?;

		let _guard = self.mutation.lock().await;
		if !self.store.delete_config(&user_id, &public_key).await? {
			return Err(ServerError::NotFound {
				user: user_id,
				public_key,
			});
		}

		self
			.reconciler
			.remove_peers(&[public_key.to_base64()])
			.await?
			.into_result()?;

		info!(%public_key, "deleted config");
		Ok(())
	}

	pub async fn enable_user(&self, user_id: &str) -> Result<()> {
		self.set_disabled(user_id, false).await
	}

	/// Takes the user's clients off the interface. Their addresses stay
	/// reserved.
	pub async fn disable_user(&self, user_id: &str) -> Result<()> {
		self.set_disabled(user_id, true).await
	}

	#[instrument(skip(self), fields(user = %user_id))]
	async fn set_disabled(&self, user_id: &str, disabled: bool) -> Result<()> {
		let user_id = parse_user(user_id)?;

		let _guard = self.mutation.lock().await;
		if !self.store.set_disabled(&user_id, disabled).await? {
			let kind = if disabled {
				ConflictKind::AlreadyDisabled(user_id)
			} else {
				ConflictKind::AlreadyEnabled(user_id)
			};
			return Err(ServerError::Conflict(kind));
		}

		self.full_sync().await?;
		info!(disabled, "user state changed");
		Ok(())
	}

	/// Replaces the interface's peer table with every enabled user's clients.
	/// Returns the number of peers applied.
	pub async fn sync(&self) -> Result<usize> {
		let _guard = self.mutation.lock().await;
		self.full_sync().await
	}

	async fn full_sync(&self) -> Result<usize> {
		let desired: Vec<DesiredPeer> = self
			.store
			.enabled_users()
			.await
			.into_iter()
			.flat_map(|(_, user)| {
				user.clients
					.into_iter()
					.map(|(key, config)| DesiredPeer::new(key.to_base64(), config.ip))
			})
			.collect();

		let applied = self.reconciler.full_sync(&desired).await?.into_result()?;
		Ok(applied)
	}
}

impl std::fmt::Debug for Server {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Server")
			.field("store", &self.store)
			.field("reconciler", &self.reconciler)
			.field("allocator", &self.allocator)
			.finish_non_exhaustive()
	}
}
