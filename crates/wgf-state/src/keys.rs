// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! WireGuard X25519 keys in the standard padded base64 encoding.

use std::fmt;
use std::sync::LazyLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use wgf_common_secret::Secret;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

/// 32 bytes encode to 43 significant characters plus one `=`; the last
/// significant character can only carry the four remaining bits.
static KEY_PATTERN: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"^[A-Za-z0-9+/]{42}[AEIMQUYcgkosw480]=$").ok());

pub const ENCODED_KEY_LEN: usize = 44;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
	#[error("key must be 44 characters of padded base64, got {0} characters")]
	InvalidFormat(usize),

	#[error("invalid base64 encoding: {0}")]
	InvalidBase64(#[from] base64::DecodeError),

	#[error("invalid key length: expected 32 bytes, got {0}")]
	InvalidLength(usize),
}

pub type Result<T> = std::result::Result<T, KeyError>;

/// True when `s` has the exact shape of an encoded WireGuard key.
pub fn is_valid_key_encoding(s: &str) -> bool {
	KEY_PATTERN.as_ref().is_some_and(|re| re.is_match(s))
}

fn decode_key(s: &str) -> Result<[u8; 32]> {
	if !is_valid_key_encoding(s) {
		return Err(KeyError::InvalidFormat(s.chars().count()));
	}
	let bytes = STANDARD.decode(s)?;
	bytes
		.as_slice()
		.try_into()
		.map_err(|_| KeyError::InvalidLength(bytes.len()))
}

#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct WgPrivateKey {
	bytes: [u8; 32],
}

impl WgPrivateKey {
	pub fn generate() -> Self {
		let secret = StaticSecret::random_from_rng(OsRng);
		Self {
			bytes: secret.to_bytes(),
		}
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_key(s.trim())?,
		})
	}

	pub fn to_base64(&self) -> Secret<String> {
		Secret::new(STANDARD.encode(self.bytes))
	}

	pub fn public_key(&self) -> WgPublicKey {
		let secret = StaticSecret::from(self.bytes);
		WgPublicKey {
			bytes: *PublicKey::from(&secret).as_bytes(),
		}
	}
}

impl fmt::Debug for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgPrivateKey")
			.field("bytes", &"[REDACTED]")
			.finish()
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WgPublicKey {
	bytes: [u8; 32],
}

impl WgPublicKey {
	pub fn from_bytes(bytes: [u8; 32]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		Ok(Self {
			bytes: decode_key(s.trim())?,
		})
	}

	pub fn to_base64(&self) -> String {
		STANDARD.encode(self.bytes)
	}

	pub fn as_bytes(&self) -> &[u8; 32] {
		&self.bytes
	}
}

impl fmt::Debug for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let b64 = self.to_base64();
		f.debug_struct("WgPublicKey")
			.field("prefix", &format!("{}...", &b64[..8]))
			.finish()
	}
}

impl fmt::Display for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_base64())
	}
}

impl std::str::FromStr for WgPublicKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self> {
		Self::from_base64(s)
	}
}

impl Serialize for WgPublicKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_base64())
	}
}

impl<'de> Deserialize<'de> for WgPublicKey {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		Self::from_base64(&s).map_err(serde::de::Error::custom)
	}
}

/// A freshly generated private key and its public half.
pub struct WgKeyPair {
	pub private: WgPrivateKey,
	pub public: WgPublicKey,
}

impl WgKeyPair {
	pub fn generate() -> Self {
		let private = WgPrivateKey::generate();
		let public = private.public_key();
		Self { private, public }
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	// RFC 7748 section 6.1 test vector (Alice).
	const ALICE_PRIVATE: [u8; 32] = [
		0x77, 0x07, 0x6d, 0x0a, 0x73, 0x18, 0xa5, 0x7d, 0x3c, 0x16, 0xc1, 0x72, 0x51, 0xb2, 0x66, 0x45,
		0xdf, 0x4c, 0x2f, 0x87, 0xeb, 0xc0, 0x99, 0x2a, 0xb1, 0x77, 0xfb, 0xa5, 0x1d, 0xb9, 0x2c, 0x2a,
	];
	const ALICE_PUBLIC: [u8; 32] = [
		0x85, 0x20, 0xf0, 0x09, 0x89, 0x30, 0xa7, 0x54, 0x74, 0x8b, 0x7d, 0xdc, 0xb4, 0x3e, 0xf7, 0x5a,
		0x0d, 0xbf, 0x3a, 0x0d, 0x26, 0x38, 0x1a, 0xf4, 0xeb, 0xa4, 0xa9, 0x8e, 0xaa, 0x9b, 0x4e, 0x6a,
	];

	#[test]
	fn derives_rfc7748_public_key() {
		let encoded = STANDARD.encode(ALICE_PRIVATE);
		let private = WgPrivateKey::from_base64(&encoded).unwrap();
		assert_eq!(private.public_key(), WgPublicKey::from_bytes(ALICE_PUBLIC));
	}

	#[test]
	fn generated_pair_is_consistent() {
		let pair = WgKeyPair::generate();
		assert_eq!(pair.private.public_key(), pair.public);
		assert_eq!(pair.public.to_base64().len(), ENCODED_KEY_LEN);
		assert!(is_valid_key_encoding(&pair.public.to_base64()));
	}

	#[test]
	fn rejects_malformed_encodings() {
		assert!(matches!(
			WgPublicKey::from_base64("short"),
			Err(KeyError::InvalidFormat(5))
		));
		// Unpadded form is not accepted.
		let unpadded = WgPublicKey::from_bytes(ALICE_PUBLIC).to_base64().trim_end_matches('=').to_string();
		assert!(WgPublicKey::from_base64(&unpadded).is_err());
		// Non-canonical final character.
		let mut bad = WgPublicKey::from_bytes(ALICE_PUBLIC).to_base64();
		bad.replace_range(42..43, "B");
		assert!(WgPublicKey::from_base64(&bad).is_err());
	}

	#[test]
	fn debug_output_hides_private_key() {
		let private = WgPrivateKey::generate();
		let encoded = private.to_base64();
		assert!(!format!("{private:?}").contains(encoded.expose().as_str()));
		assert_eq!(format!("{encoded}"), "[REDACTED]");
	}

	#[test]
	fn public_key_serde_round_trip() {
		let key = WgPublicKey::from_bytes(ALICE_PUBLIC);
		let json = serde_json::to_string(&key).unwrap();
		assert_eq!(json, format!("\"{}\"", key.to_base64()));
		let parsed: WgPublicKey = serde_json::from_str(&json).unwrap();
		assert_eq!(parsed, key);
	}

	proptest! {
		#[test]
		fn every_key_encoding_matches_pattern(bytes in any::<[u8; 32]>()) {
			let encoded = WgPublicKey::from_bytes(bytes).to_base64();
			prop_assert!(is_valid_key_encoding(&encoded));
			let decoded = WgPublicKey::from_base64(&encoded).unwrap();
			prop_assert_eq!(decoded.as_bytes(), &bytes);
		}
	}
}
