// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::IpNet;
use std::fmt;
use std::net::IpAddr;
use thiserror::Error;
use wgpeer_common::{PublicKey, UserId};
use wgpeer_device::{DeviceError, KeyRejection, ReconcileError};
use wgpeer_store::StoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AllocError {
	#[error("unable to allocate IP address, range {pool} exhausted")]
	Exhausted { pool: IpNet },
}

/// Why a request was a no-op or lost a race against current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictKind {
	AlreadyEnabled(UserId),
	AlreadyDisabled(UserId),
	PublicKeyInUse { public_key: PublicKey, owner: UserId },
	/// A stored address is also held by a different config.
	AddressInUse(IpAddr),
	/// Every allocation attempt lost to a concurrent writer.
	AllocationContention { attempts: usize },
}

impl fmt::Display for ConflictKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConflictKind::AlreadyEnabled(user) => write!(f, "user '{user}' was already enabled"),
			ConflictKind::AlreadyDisabled(user) => write!(f, "user '{user}' was already disabled"),
			ConflictKind::PublicKeyInUse { public_key, owner } => {
				write!(f, "public key {public_key} belongs to user '{owner}'")
			}
			ConflictKind::AddressInUse(ip) => write!(f, "address {ip} is held by another config"),
			ConflictKind::AllocationContention { attempts } => {
				write!(f, "IP allocation lost {attempts} consecutive races")
			}
		}
	}
}

#[derive(Debug, Error)]
pub enum ServerError {
	#[error(transparent)]
	Exhausted(#[from] AllocError),

	#[error("conflict: {0}")]
	Conflict(ConflictKind),

	#[error("config not found: user '{user}' does not have a config with public key '{public_key}'")]
	NotFound { user: UserId, public_key: PublicKey },

	#[error("malformed input: {0}")]
	MalformedInput(String),

	#[error("{} peer key(s) rejected by reconciliation, {applied} applied", .rejected.len())]
	PartialReconcile {
		applied: usize,
		rejected: Vec<KeyRejection>,
	},

	#[error("peer {0} is on the interface but has no stored owner")]
	UnknownPeer(PublicKey),

	#[error("WireGuard device error: {0}")]
	Device(#[from] DeviceError),

	#[error("storage error: {0}")]
	Storage(StoreError),
}

impl ServerError {
	/// Errors caused by the request rather than by the daemon or the device.
	pub fn is_client_error(&self) -> bool {
		matches!(
			self,
			ServerError::Conflict(_) | ServerError::NotFound { .. } | ServerError::MalformedInput(_)
		)
	}
}

impl From<StoreError> for ServerError {
	fn from(err: StoreError) -> Self {
		match err {
			StoreError::PublicKeyInUse { public_key, owner } => {
				ServerError::Conflict(ConflictKind::PublicKeyInUse { public_key, owner })
			}
			other => ServerError::Storage(other),
		}
	}
}

impl From<ReconcileError> for ServerError {
	fn from(err: ReconcileError) -> Self {
		match err {
			ReconcileError::Device(e) => ServerError::Device(e),
			ReconcileError::Partial { applied, rejected } => {
				ServerError::PartialReconcile { applied, rejected }
			}
		}
	}
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
	use super::*;
	use wgpeer_common::KeyPair;

	#[test]
	fn store_key_conflict_maps_to_conflict() {
		let err: ServerError = StoreError::PublicKeyInUse {
			public_key: *KeyPair::generate().public_key(),
			owner: UserId::new("alice"),
		}
		.into();

		assert!(matches!(
			err,
			ServerError::Conflict(ConflictKind::PublicKeyInUse { .. })
		));
		assert!(err.is_client_error());
	}

	#[test]
	fn device_and_exhaustion_are_server_side() {
		let exhausted = ServerError::from(AllocError::Exhausted {
			pool: "10.0.0.0/30".parse().unwrap(),
		});
		assert!(!exhausted.is_client_error());
		assert_eq!(
			exhausted.to_string(),
			"unable to allocate IP address, range 10.0.0.0/30 exhausted"
		);

		let device = ServerError::from(ReconcileError::Device(DeviceError::Unavailable(
			"down".to_string(),
		)));
		assert!(matches!(device, ServerError::Device(_)));
		assert!(!device.is_client_error());
	}

	#[test]
	fn conflict_messages_name_the_user() {
		let err = ServerError::Conflict(ConflictKind::AlreadyDisabled(UserId::new("bob")));
		assert_eq!(err.to_string(), "conflict: user 'bob' was already disabled");
	}
}
