// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Top-level configuration layer merged from every source.

use serde::Deserialize;

use crate::sections::{LoggingConfigLayer, StorageConfigLayer, WireguardConfigLayer};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonConfigLayer {
	#[serde(default)]
	pub wireguard: Option<WireguardConfigLayer>,
	#[serde(default)]
	pub storage: Option<StorageConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

impl DaemonConfigLayer {
	/// Merges `other` on top of `self`. Values set in `other` win.
	pub fn merge(&mut self, other: DaemonConfigLayer) {
		merge_option(&mut self.wireguard, other.wireguard, |a, b| a.merge(b));
		merge_option(&mut self.storage, other.storage, |a, b| a.merge(b));
		merge_option(&mut self.logging, other.logging, |a, b| a.merge(b));
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}
