// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};
use wgpeer_common::{ClientConfig, KeyPair, PrivateKey, PublicKey, User, UserId};

use crate::document::StorageDocument;
use crate::error::{Result, StoreError};

/// Outcome of a closure passed to [`PeerStore::modify`].
enum Change<T> {
	/// The candidate document was modified and must be persisted.
	Changed(T),
	Unchanged(T),
}

/// Durable store of users, their client configs and the server identity.
///
/// Every mutation runs under the write lock and rewrites the whole document
/// before the lock is released. The document is written to a sibling temp
/// file and renamed over the target; the in-memory copy is swapped only
/// after the rename succeeds, so a failed write leaves both at the previous
/// state.
pub struct PeerStore {
	path: PathBuf,
	document: RwLock<StorageDocument>,
}

impl PeerStore {
	/// Writes a fresh document with the given server identity.
	///
	/// Fails with [`StoreError::AlreadyExists`] rather than overwriting an
	/// existing deployment's keys.
	#[instrument(skip(keypair), fields(path = %path.as_ref().display()))]
	pub async fn create(path: impl AsRef<Path>, keypair: &KeyPair) -> Result<Self> {
		let path = path.as_ref().to_path_buf();

		if path_exists(&path).await? {
			return Err(StoreError::AlreadyExists(path));
		}

		let document = StorageDocument::new(keypair);
		write_document(&path, &document).await?;

		info!(public_key = %document.public_key, "created storage file");

		Ok(Self {
			path,
			document: RwLock::new(document),
		})
	}

	#[instrument(fields(path = %path.as_ref().display()))]
	pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref().to_path_buf();

		let content = fs::read(&path).await.map_err(|source| StoreError::Read {
			path: path.clone(),
			source,
		})?;
		let document: StorageDocument =
			serde_json::from_slice(&content).map_err(|source| StoreError::Parse {
				path: path.clone(),
				source,
			})?;

		if document.private_key.public_key() != document.public_key {
			warn!(
				public_key = %document.public_key,
				"stored public key does not match the stored private key"
			);
		}

		debug!(users = document.users.len(), "loaded storage file");

		Ok(Self {
			path,
			document: RwLock::new(document),
		})
	}

	/// Opens the document at `path`, generating a server identity on first run.
	pub async fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
		let path = path.as_ref();
		if path_exists(path).await? {
			Self::open(path).await
		} else {
			Self::create(path, &KeyPair::generate()).await
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub async fn server_public_key(&self) -> PublicKey {
		self.document.read().await.public_key
	}

	pub async fn server_private_key(&self) -> PrivateKey {
		self.document.read().await.private_key.clone()
	}

	pub async fn snapshot(&self) -> StorageDocument {
		self.document.read().await.clone()
	}

	pub async fn get_user(&self, user_id: &UserId) -> Option<User> {
		self.document.read().await.users.get(user_id).cloned()
	}

	#[instrument(skip(self), fields(user = %user_id))]
	pub async fn get_or_create_user(&self, user_id: &UserId) -> Result<User> {
		self
			.modify(|doc| match doc.users.get(user_id) {
				Some(user) => Ok(Change::Unchanged(user.clone())),
				None => {
					doc.users.insert(user_id.clone(), User::default());
					Ok(Change::Changed(User::default()))
				}
			})
			.await
	}

	/// Copy of the user's clients; empty for an unknown user.
	pub async fn get_clients(&self, user_id: &UserId) -> HashMap<PublicKey, ClientConfig> {
		self
			.document
			.read()
			.await
			.users
			.get(user_id)
			.map(|user| user.clients.clone())
			.unwrap_or_default()
	}

	/// Stores `config` under `public_key` for `user_id`, creating the user if needed.
	///
	/// Returns `false` without writing when `config.ip` is already held by any
	/// other client. The check runs against the document as it is under the
	/// write lock, so two callers that allocated the same address cannot both
	/// succeed.
	#[instrument(skip(self, config), fields(user = %user_id, %public_key, ip = %config.ip))]
	pub async fn update_or_create_config(
		&self,
		user_id: &UserId,
		public_key: &PublicKey,
		config: ClientConfig,
	) -> Result<bool> {
		self
			.modify(|doc| {
				if let Some((owner, _)) = doc.owner_of(public_key) {
					if owner != user_id {
						return Err(StoreError::PublicKeyInUse {
							public_key: *public_key,
							owner: owner.clone(),
						});
					}
				}

				if doc.ip_taken_by_other(config.ip, user_id, public_key) {
					debug!("ip already allocated, refusing");
					return Ok(Change::Unchanged(false));
				}

				doc
					.users
					.entry(user_id.clone())
					.or_default()
					.clients
					.insert(*public_key, config);
				Ok(Change::Changed(true))
			})
			.await
	}

	/// Returns `true` if the config existed and was removed.
	#[instrument(skip(self), fields(user = %user_id, %public_key))]
	pub async fn delete_config(&self, user_id: &UserId, public_key: &PublicKey) -> Result<bool> {
		self
			.modify(|doc| {
				let removed = doc
					.users
					.get_mut(user_id)
					.and_then(|user| user.clients.remove(public_key))
					.is_some();
				Ok(if removed {
					Change::Changed(true)
				} else {
					Change::Unchanged(false)
				})
			})
			.await
	}

	/// Sets the user's disabled flag and returns whether it changed.
	///
	/// Disabling an unknown user records them as disabled so their future
	/// configs stay off the interface. Enabling an unknown user is a no-op.
	#[instrument(skip(self), fields(user = %user_id, disabled))]
	pub async fn set_disabled(&self, user_id: &UserId, disabled: bool) -> Result<bool> {
		self
			.modify(|doc| match doc.users.get_mut(user_id) {
				Some(user) if user.is_disabled == disabled => Ok(Change::Unchanged(false)),
				Some(user) => {
					user.is_disabled = disabled;
					Ok(Change::Changed(true))
				}
				None if disabled => {
					doc.users.insert(
						user_id.clone(),
						User {
							is_disabled: true,
							..User::default()
						},
					);
					Ok(Change::Changed(true))
				}
				None => Ok(Change::Unchanged(false)),
			})
			.await
	}

	/// Every address held by a client, across all users, enabled or not.
	pub async fn allocated_ips(&self) -> HashSet<IpAddr> {
		self.document.read().await.allocated_ips()
	}

	pub async fn enabled_users(&self) -> Vec<(UserId, User)> {
		self
			.document
			.read()
			.await
			.users
			.iter()
			.filter(|(_, user)| user.is_enabled())
			.map(|(id, user)| (id.clone(), user.clone()))
			.collect()
	}

	pub async fn find_owner(&self, public_key: &PublicKey) -> Option<(UserId, ClientConfig)> {
		self
			.document
			.read()
			.await
			.owner_of(public_key)
			.map(|(id, config)| (id.clone(), config.clone()))
	}

	async fn modify<T, F>(&self, op: F) -> Result<T>
	where
		F: FnOnce(&mut StorageDocument) -> Result<Change<T>>,
	{
		let mut document = self.document.write().await;
		let mut candidate = document.clone();

		match op(&mut candidate)? {
			Change::Unchanged(value) => Ok(value),
			Change::Changed(value) => {
				write_document(&self.path, &candidate).await?;
				*document = candidate;
				Ok(value)
			}
		}
	}
}

impl std::fmt::Debug for PeerStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PeerStore")
			.field("path", &self.path)
			.finish_non_exhaustive()
	}
}

async fn path_exists(path: &Path) -> Result<bool> {
	fs::try_exists(path).await.map_err(|source| StoreError::Read {
		path: path.to_path_buf(),
		source,
	})
}

fn temp_path(path: &Path) -> PathBuf {
	let mut name = path
		.file_name()
		.map(|n| n.to_os_string())
		.unwrap_or_default();
	name.push(".tmp");
	path.with_file_name(name)
}

async fn write_document(path: &Path, document: &StorageDocument) -> Result<()> {
	let json = serde_json::to_vec_pretty(document)?;
	let tmp_path = temp_path(path);

	let written = write_private_file(&tmp_path, &json).await;
	let result = match written {
		Ok(()) => fs::rename(&tmp_path, path).await,
		Err(e) => Err(e),
	};

	if let Err(source) = result {
		let _ = fs::remove_file(&tmp_path).await;
		return Err(StoreError::Write {
			path: path.to_path_buf(),
			source,
		});
	}

	debug!(path = %path.display(), bytes = json.len(), "wrote storage file");
	Ok(())
}

/// Creates `path` fresh so its mode is always 0600. A leftover file from an
/// interrupted write is removed first, since reopening it would keep its
/// original permissions.
async fn write_private_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
	match fs::remove_file(path).await {
		Ok(()) => debug!(path = %path.display(), "removed stale temp file"),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
		Err(e) => return Err(e),
	}

	let mut options = fs::OpenOptions::new();
	options.write(true).create_new(true);
	#[cfg(unix)]
	options.mode(0o600);

	let mut file = options.open(path).await?;
	file.write_all(content).await?;
	file.sync_all().await?;
	Ok(())
}
