// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use thiserror::Error;
use wgpeer_common::{PublicKey, UserId};

#[derive(Debug, Error)]
pub enum StoreError {
	#[error("storage file '{0}' already exists")]
	AlreadyExists(PathBuf),

	#[error("could not read storage file '{path}': {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse storage file '{path}': {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("failed to serialize storage document: {0}")]
	Serialize(#[from] serde_json::Error),

	#[error("failed to write storage file '{path}': {source}")]
	Write {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("public key {public_key} is already registered to user '{owner}'")]
	PublicKeyInUse { public_key: PublicKey, owner: UserId },
}

pub type Result<T> = std::result::Result<T, StoreError>;
