// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// UTC instant with whole-second precision.
///
/// Serialized as RFC 3339 without fractional seconds (`2025-01-02T03:04:05Z`).
/// Some consumers of the storage document reject fractional timestamps, so
/// sub-second precision is dropped on construction and on parse.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
	pub fn now() -> Self {
		Self::from_datetime(Utc::now())
	}

	pub fn from_datetime(dt: DateTime<Utc>) -> Self {
		Self(dt.trunc_subsecs(0))
	}

	pub fn as_datetime(&self) -> DateTime<Utc> {
		self.0
	}

	pub fn to_rfc3339(&self) -> String {
		self.0.to_rfc3339_opts(SecondsFormat::Secs, true)
	}

	pub fn parse(s: &str) -> Result<Self, chrono::ParseError> {
		DateTime::parse_from_rfc3339(s).map(|dt| Self::from_datetime(dt.with_timezone(&Utc)))
	}
}

impl From<DateTime<Utc>> for Timestamp {
	fn from(dt: DateTime<Utc>) -> Self {
		Self::from_datetime(dt)
	}
}

impl fmt::Display for Timestamp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_rfc3339())
	}
}

impl fmt::Debug for Timestamp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Timestamp({})", self.to_rfc3339())
	}
}

impl Serialize for Timestamp {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_rfc3339())
	}
}

impl<'de> Deserialize<'de> for Timestamp {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let s = String::deserialize(deserializer)?;
		Self::parse(&s).map_err(serde::de::Error::custom)
	}
}
