// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use thiserror::Error;
use wgpeer_common::KeyError;

#[derive(Debug, Error)]
pub enum DeviceError {
	#[error("invalid interface name '{0}'")]
	InvalidInterfaceName(String),

	#[error("interface '{0}' does not exist")]
	NoSuchInterface(String),

	#[error("backend '{0}' is not supported on this platform")]
	UnsupportedBackend(&'static str),

	#[error("WireGuard control call on '{interface}' failed: {source}")]
	Io {
		interface: String,
		#[source]
		source: std::io::Error,
	},

	#[error("device returned an unusable key: {0}")]
	InvalidKey(String),

	#[error("device task failed: {0}")]
	Task(String),

	#[error("device unavailable: {0}")]
	Unavailable(String),
}

/// A peer key that could not be decoded and was left out of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRejection {
	pub public_key: String,
	pub error: KeyError,
}

impl fmt::Display for KeyRejection {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "'{}': {}", self.public_key, self.error)
	}
}

#[derive(Debug, Error)]
pub enum ReconcileError {
	#[error(transparent)]
	Device(#[from] DeviceError),

	#[error("{} peer key(s) rejected, {applied} applied: {}", .rejected.len(), join(.rejected))]
	Partial {
		applied: usize,
		rejected: Vec<KeyRejection>,
	},
}

fn join(rejected: &[KeyRejection]) -> String {
	rejected
		.iter()
		.map(ToString::to_string)
		.collect::<Vec<_>>()
		.join(", ")
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
