// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::keys::PublicKey;
use crate::timestamp::Timestamp;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

/// Opaque user identifier, typically the authenticated username.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for UserId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for UserId {
	fn from(s: &str) -> Self {
		Self(s.to_string())
	}
}

impl From<String> for UserId {
	fn from(s: String) -> Self {
		Self(s)
	}
}

/// A device configuration belonging to a user, keyed by its public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	pub name: String,
	pub ip: IpAddr,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub note: Option<String>,
	pub modified: Timestamp,
}

impl ClientConfig {
	pub fn new(name: impl Into<String>, ip: IpAddr) -> Self {
		Self {
			name: name.into(),
			ip,
			note: None,
			modified: Timestamp::now(),
		}
	}

	pub fn with_note(mut self, note: impl Into<String>) -> Self {
		self.note = Some(note.into());
		self
	}

	/// The single-host network routed to this client.
	pub fn allowed_ip(&self) -> IpNet {
		host_net(self.ip)
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
	#[serde(default)]
	pub is_disabled: bool,
	#[serde(default)]
	pub clients: HashMap<PublicKey, ClientConfig>,
}

impl User {
	pub fn is_enabled(&self) -> bool {
		!self.is_disabled
	}
}

/// `/32` for IPv4, `/128` for IPv6.
pub fn host_net(ip: IpAddr) -> IpNet {
	IpNet::from(ip)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::keys::KeyPair;

	#[test]
	fn host_net_is_single_address() {
		let v4 = host_net("10.0.0.2".parse().unwrap());
		assert_eq!(v4.to_string(), "10.0.0.2/32");

		let v6 = host_net("fd00::2".parse().unwrap());
		assert_eq!(v6.to_string(), "fd00::2/128");
	}

	#[test]
	fn client_config_json_field_names() {
		let config = ClientConfig::new("laptop", "10.0.0.2".parse().unwrap());
		let value = serde_json::to_value(&config).unwrap();

		assert_eq!(value["name"], "laptop");
		assert_eq!(value["ip"], "10.0.0.2");
		assert!(value["modified"].is_string());
		assert!(value.get("note").is_none());
	}

	#[test]
	fn client_config_note_roundtrips() {
		let config = ClientConfig::new("phone", "10.0.0.3".parse().unwrap()).with_note("work phone");
		let json = serde_json::to_string(&config).unwrap();
		let parsed: ClientConfig = serde_json::from_str(&json).unwrap();
		assert_eq!(parsed.note.as_deref(), Some("work phone"));
	}

	#[test]
	fn user_uses_camel_case() {
		let mut user = User::default();
		user.is_disabled = true;
		user.clients.insert(
			*KeyPair::generate().public_key(),
			ClientConfig::new("laptop", "10.0.0.2".parse().unwrap()),
		);

		let value = serde_json::to_value(&user).unwrap();
		assert_eq!(value["isDisabled"], true);
		assert_eq!(value["clients"].as_object().unwrap().len(), 1);
	}

	#[test]
	fn user_id_is_transparent() {
		let id = UserId::new("alice");
		assert_eq!(serde_json::to_string(&id).unwrap(), "\"alice\"");
	}
}
