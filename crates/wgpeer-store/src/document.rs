// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use wgpeer_common::{ClientConfig, KeyPair, PrivateKey, PublicKey, User, UserId};

/// The persisted aggregate: server identity plus every user and their clients.
///
/// ```json
/// {
///   "privateKey": "...",
///   "publicKey": "...",
///   "users": {
///     "alice": {
///       "isDisabled": false,
///       "clients": { "<publicKey>": { "name": "laptop", "ip": "10.0.0.2", "modified": "2025-01-02T03:04:05Z" } }
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageDocument {
	pub private_key: PrivateKey,
	pub public_key: PublicKey,
	#[serde(default)]
	pub users: HashMap<UserId, User>,
}

impl StorageDocument {
	pub fn new(keypair: &KeyPair) -> Self {
		Self {
			private_key: keypair.private_key().clone(),
			public_key: *keypair.public_key(),
			users: HashMap::new(),
		}
	}

	pub fn owner_of(&self, public_key: &PublicKey) -> Option<(&UserId, &ClientConfig)> {
		self.users.iter().find_map(|(user_id, user)| {
			user.clients
				.get(public_key)
				.map(|config| (user_id, config))
		})
	}

	pub fn allocated_ips(&self) -> HashSet<IpAddr> {
		self.users
			.values()
			.flat_map(|user| user.clients.values().map(|config| config.ip))
			.collect()
	}

	/// Whether `ip` is held by any client other than `(user_id, public_key)`.
	pub(crate) fn ip_taken_by_other(
		&self,
		ip: IpAddr,
		user_id: &UserId,
		public_key: &PublicKey,
	) -> bool {
		self.users.iter().any(|(owner, user)| {
			user.clients
				.iter()
				.any(|(key, config)| config.ip == ip && !(owner == user_id && key == public_key))
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn top_level_field_names() {
		let doc = StorageDocument::new(&KeyPair::generate());
		let value = serde_json::to_value(&doc).unwrap();
		assert!(value["privateKey"].is_string());
		assert!(value["publicKey"].is_string());
		assert!(value["users"].is_object());
	}

	#[test]
	fn missing_users_defaults_to_empty() {
		let keypair = KeyPair::generate();
		let json = format!(
			r#"{{"privateKey":"{}","publicKey":"{}"}}"#,
			keypair.private_key().to_base64(),
			keypair.public_key().to_base64()
		);
		let doc: StorageDocument = serde_json::from_str(&json).unwrap();
		assert!(doc.users.is_empty());
	}

	#[test]
	fn own_ip_is_not_taken_by_other() {
		let mut doc = StorageDocument::new(&KeyPair::generate());
		let key = *KeyPair::generate().public_key();
		let ip: IpAddr = "10.0.0.2".parse().unwrap();
		let mut user = User::default();
		user.clients.insert(key, ClientConfig::new("laptop", ip));
		doc.users.insert(UserId::new("alice"), user);

		assert!(!doc.ip_taken_by_other(ip, &UserId::new("alice"), &key));
		assert!(doc.ip_taken_by_other(ip, &UserId::new("bob"), &key));
		assert!(doc.ip_taken_by_other(ip, &UserId::new("alice"), KeyPair::generate().public_key()));
	}
}
