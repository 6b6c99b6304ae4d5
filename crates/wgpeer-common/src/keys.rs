// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard key types.
//!
//! Keys are 32 raw bytes with a canonical standard-base64 text form (44
//! characters including padding). The text form is what goes on the wire and
//! into the storage document, so both key types serialize as strings and
//! [`PublicKey`] can be used as a JSON map key.

use base64::prelude::*;
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use x25519_dalek::StaticSecret;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const KEY_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
	#[error("invalid base64: {0}")]
	InvalidBase64(String),

	#[error("invalid key length: expected {KEY_LEN} bytes, got {0}")]
	InvalidLength(usize),
}

fn decode_key(encoded: &str) -> Result<[u8; KEY_LEN], KeyError> {
	let mut bytes = BASE64_STANDARD
		.decode(encoded.trim())
		.map_err(|e| KeyError::InvalidBase64(e.to_string()))?;
	let len = bytes.len();
	let key = <[u8; KEY_LEN]>::try_from(bytes.as_slice()).map_err(|_| KeyError::InvalidLength(len));
	bytes.zeroize();
	key
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; KEY_LEN]);

impl PublicKey {
	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self(bytes)
	}

	pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
		&self.0
	}

	pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
		decode_key(encoded).map(Self)
	}

	pub fn to_base64(&self) -> String {
		BASE64_STANDARD.encode(self.0)
	}
}

impl fmt::Display for PublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_base64())
	}
}

impl fmt::Debug for PublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "PublicKey({})", self.to_base64())
	}
}

impl FromStr for PublicKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_base64(s)
	}
}

impl Serialize for PublicKey {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_base64())
	}
}

impl<'de> Deserialize<'de> for PublicKey {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let encoded = String::deserialize(deserializer)?;
		Self::from_base64(&encoded).map_err(serde::de::Error::custom)
	}
}

/// A Curve25519 private key. Zeroized on drop; `Debug` never prints the bytes.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; KEY_LEN]);

impl PrivateKey {
	/// Generates a clamped private key, matching `wg genkey`.
	pub fn generate() -> Self {
		let secret = StaticSecret::random_from_rng(OsRng);
		let mut bytes = secret.to_bytes();
		bytes[0] &= 248;
		bytes[31] &= 127;
		bytes[31] |= 64;
		Self(bytes)
	}

	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self(bytes)
	}

	pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
		decode_key(encoded).map(Self)
	}

	pub fn to_base64(&self) -> String {
		BASE64_STANDARD.encode(self.0)
	}

	pub fn public_key(&self) -> PublicKey {
		let secret = StaticSecret::from(self.0);
		PublicKey(x25519_dalek::PublicKey::from(&secret).to_bytes())
	}
}

impl fmt::Debug for PrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("PrivateKey([REDACTED])")
	}
}

impl FromStr for PrivateKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::from_base64(s)
	}
}

impl Serialize for PrivateKey {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&self.to_base64())
	}
}

impl<'de> Deserialize<'de> for PrivateKey {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let mut encoded = String::deserialize(deserializer)?;
		let key = Self::from_base64(&encoded).map_err(serde::de::Error::custom);
		encoded.zeroize();
		key
	}
}

#[derive(Clone, Debug)]
pub struct KeyPair {
	private: PrivateKey,
	public: PublicKey,
}

impl KeyPair {
	pub fn generate() -> Self {
		Self::from_private_key(PrivateKey::generate())
	}

	pub fn from_private_key(private: PrivateKey) -> Self {
		let public = private.public_key();
		Self { private, public }
	}

	pub fn private_key(&self) -> &PrivateKey {
		&self.private
	}

	pub fn public_key(&self) -> &PublicKey {
		&self.public
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn public_key_base64_is_44_chars() {
		let keypair = KeyPair::generate();
		assert_eq!(keypair.public_key().to_base64().len(), 44);
	}

	#[test]
	fn derived_public_key_is_stable() {
		let private = PrivateKey::generate();
		assert_eq!(private.public_key(), private.public_key());

		let reparsed = PrivateKey::from_base64(&private.to_base64()).unwrap();
		assert_eq!(reparsed.public_key(), private.public_key());
	}

	#[test]
	fn known_vector_matches_wg_pubkey() {
		// RFC 7748 section 6.1, Alice's key pair.
		let private = PrivateKey::from_bytes([
			0x77, 0x07, 0x6d, 0x0a, 0x73, 0x18, 0xa5, 0x7d, 0x3c, 0x16, 0xc1, 0x72, 0x51, 0xb2, 0x66,
			0x45, 0xdf, 0x4c, 0x2f, 0x87, 0xeb, 0xc0, 0x99, 0x2a, 0xb1, 0x77, 0xfb, 0xa5, 0x1d, 0xb9,
			0x2c, 0x2a,
		]);
		let expected = PublicKey::from_bytes([
			0x85, 0x20, 0xf0, 0x09, 0x89, 0x30, 0xa7, 0x54, 0x74, 0x8b, 0x7d, 0xdc, 0xb4, 0x3e, 0xf7,
			0x5a, 0x0d, 0xbf, 0x3a, 0x0d, 0x26, 0x38, 0x1a, 0xf4, 0xeb, 0xa4, 0xa9, 0x8e, 0xaa, 0x9b,
			0x4e, 0x6a,
		]);
		assert_eq!(private.public_key(), expected);
	}

	#[test]
	fn generated_key_is_clamped() {
		let private = PrivateKey::generate();
		let bytes = BASE64_STANDARD.decode(private.to_base64()).unwrap();
		assert_eq!(bytes[0] & 7, 0);
		assert_eq!(bytes[31] & 128, 0);
		assert_eq!(bytes[31] & 64, 64);
	}

	#[test]
	fn rejects_wrong_length() {
		let short = BASE64_STANDARD.encode([1u8; 16]);
		assert_eq!(
			PublicKey::from_base64(&short),
			Err(KeyError::InvalidLength(16))
		);
	}

	#[test]
	fn rejects_invalid_base64() {
		let result = PublicKey::from_base64("not a key!");
		assert!(matches!(result, Err(KeyError::InvalidBase64(_))));
	}

	#[test]
	fn private_key_debug_is_redacted() {
		let private = PrivateKey::generate();
		let debug = format!("{:?}", private);
		assert!(!debug.contains(&private.to_base64()));
		assert!(debug.contains("REDACTED"));
	}

	#[test]
	fn public_key_works_as_json_map_key() {
		let key = *KeyPair::generate().public_key();
		let mut map = std::collections::HashMap::new();
		map.insert(key, 1u8);

		let json = serde_json::to_string(&map).unwrap();
		assert!(json.contains(&key.to_base64()));

		let parsed: std::collections::HashMap<PublicKey, u8> = serde_json::from_str(&json).unwrap();
		assert_eq!(parsed.get(&key), Some(&1));
	}

	proptest! {
		#[test]
		fn any_32_bytes_parse_back(bytes in proptest::array::uniform32(any::<u8>())) {
			let key = PublicKey::from_bytes(bytes);
			prop_assert_eq!(PublicKey::from_base64(&key.to_base64()).unwrap(), key);
		}
	}
}
