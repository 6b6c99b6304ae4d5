// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use wgpeer_common::{PublicKey, UserId};
use wgpeer_device::Reconciler;
use wgpeer_store::PeerStore;

use crate::error::{Result, ServerError};

/// WireGuard stops sending data to a peer whose last handshake is older than
/// this many seconds, so such a peer is treated as disconnected.
pub const REJECT_AFTER_SECS: i64 = 180;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
	pub public_key: PublicKey,
	pub name: String,
	#[serde(rename = "allowedIPs")]
	pub allowed_ips: Vec<String>,
}

pub type Connections = BTreeMap<UserId, Vec<Connection>>;

pub fn is_recent(last_handshake: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
	last_handshake.is_some_and(|at| now - at < Duration::seconds(REJECT_AFTER_SECS))
}

/// Read-only view of which peers have handshaked recently, grouped by owner.
pub struct ConnectionMonitor {
	store: Arc<PeerStore>,
	reconciler: Arc<Reconciler>,
}

impl ConnectionMonitor {
	pub fn new(store: Arc<PeerStore>, reconciler: Arc<Reconciler>) -> Self {
		Self { store, reconciler }
	}

	pub async fn connections(&self) -> Result<Connections> {
		self.connections_at(Utc::now()).await
	}

	/// Fails with [`ServerError::UnknownPeer`] if a recent peer has no stored
	/// owner, since that means the interface and the store have diverged.
	#[instrument(skip(self))]
	pub async fn connections_at(&self, now: DateTime<Utc>) -> Result<Connections> {
		let peers = self.reconciler.live_peers().await?;
		let mut connections = Connections::new();

		for peer in peers
			.into_iter()
			.filter(|p| is_recent(p.last_handshake, now))
		{
			let Some((owner, config)) = self.store.find_owner(&peer.public_key).await else {
				warn!(public_key = %peer.public_key, "recent peer has no stored owner");
				return Err(ServerError::UnknownPeer(peer.public_key));
			};

			connections.entry(owner).or_default().push(Connection {
				public_key: peer.public_key,
				name: config.name,
				allowed_ips: peer.allowed_ips.iter().map(ToString::to_string).collect(),
			});
		}

		debug!(users = connections.len(), "collected connections");
		Ok(connections)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn recency_window_is_strict() {
		let now = Utc::now();
		assert!(is_recent(Some(now - Duration::seconds(179)), now));
		assert!(!is_recent(Some(now - Duration::seconds(180)), now));
		assert!(!is_recent(Some(now - Duration::seconds(181)), now));
		assert!(!is_recent(None, now));
	}

	#[test]
	fn connection_json_shape() {
		let connection = Connection {
			public_key: *wgpeer_common::KeyPair::generate().public_key(),
			name: "laptop".to_string(),
			allowed_ips: vec!["10.0.0.2/32".to_string()],
		};
		let value = serde_json::to_value(&connection).unwrap();
		assert!(value["publicKey"].is_string());
		assert_eq!(value["name"], "laptop");
		assert_eq!(value["allowedIPs"][0], "10.0.0.2/32");
	}
}
