// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Storage configuration.

use serde::Deserialize;
use std::path::PathBuf;

const DEFAULT_PATH: &str = "./conf.json";

/// Storage configuration (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
	pub path: PathBuf,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			path: PathBuf::from(DEFAULT_PATH),
		}
	}
}

/// Storage configuration layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfigLayer {
	#[serde(default)]
	pub path: Option<PathBuf>,
}

impl StorageConfigLayer {
	pub fn merge(&mut self, other: StorageConfigLayer) {
		if other.path.is_some() {
			self.path = other.path;
		}
	}

	pub fn finalize(self) -> StorageConfig {
		StorageConfig {
			path: self.path.unwrap_or_else(|| PathBuf::from(DEFAULT_PATH)),
		}
	}
}
