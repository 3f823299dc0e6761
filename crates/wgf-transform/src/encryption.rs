// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Encryption of persisted state at rest.
//!
//! [`EncryptingSaver`] replaces a mapping with a sealed envelope before the
//! inner saver (normally [`SigningSaver`](crate::SigningSaver)) writes it, so
//! the digest covers the ciphertext. [`DecryptingLoader`] opens envelopes on the
//! way back in.
//!
//! Each envelope carries its own random salt. The AES-256-GCM key is derived
//! from the root passphrase and that salt with Argon2id.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aes_gcm::{
	aead::{Aead, KeyInit, OsRng},
	Aes256Gcm, Key, Nonce,
};
use argon2::Argon2;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use wgf_common_secret::SecretString;
use zeroize::Zeroizing;

use crate::error::{LoadError, SaveError};
use crate::loader::ConfigurationLoader;
use crate::map::ConfigMap;
use crate::saver::ConfigurationSaver;
use crate::source::ConfigurationSource;

/// Single top-level key of an encrypted state file.
pub const ENVELOPE_KEY: &str = "wgf_encrypted";

/// Size of the derived key in bytes (256 bits for AES-256).
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

pub const SALT_SIZE: usize = 16;

const CIPHER_NAME: &str = "aes-256-gcm";
const KDF_NAME: &str = "argon2id";

#[derive(Debug, Error)]
pub enum CipherError {
	#[error("key derivation failed: {0}")]
	Kdf(String),

	#[error("encryption failed")]
	Seal,

	#[error("wrong root passphrase or corrupted ciphertext")]
	Open,

	#[error("malformed envelope: {0}")]
	Envelope(String),
}

#[inline]
fn argon2_instance() -> Argon2<'static> {
	#[cfg(test)]
	{
		use argon2::{Algorithm, Params, Version};
		// Cheap parameters so unit tests stay fast.
		let params = Params::new(1024, 1, 1, None).expect("valid Argon2 params for tests");
		Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
	}

	#[cfg(not(test))]
	{
		Argon2::default()
	}
}

/// Seals and opens state mappings with a key derived from the root passphrase.
#[derive(Clone)]
pub struct StateCipher {
	passphrase: SecretString,
}

impl fmt::Debug for StateCipher {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StateCipher")
			.field("cipher", &CIPHER_NAME)
			.field("kdf", &KDF_NAME)
			.finish()
	}
}

impl StateCipher {
	pub fn new(passphrase: SecretString) -> Self {
		Self { passphrase }
	}

	fn derive(&self, salt: &[u8]) -> Result<Zeroizing<[u8; KEY_SIZE]>, CipherError> {
		let mut key = Zeroizing::new([0u8; KEY_SIZE]);
		argon2_instance()
			.hash_password_into(self.passphrase.expose().as_bytes(), salt, key.as_mut())
			.map_err(|e| CipherError::Kdf(e.to_string()))?;
		Ok(key)
	}

	/// Encrypt `data` into a mapping holding only the envelope.
	pub fn seal(&self, data: &ConfigMap) -> Result<ConfigMap, CipherError> {
		let plaintext = Zeroizing::new(
			serde_json::to_vec(data).map_err(|e| CipherError::Envelope(e.to_string()))?,
		);

		let mut salt = [0u8; SALT_SIZE];
		OsRng.fill_bytes(&mut salt);
		let mut nonce = [0u8; NONCE_SIZE];
		OsRng.fill_bytes(&mut nonce);

		let key = self.derive(&salt)?;
		let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
		let ciphertext = cipher
			.encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
			.map_err(|_| CipherError::Seal)?;

		let mut envelope = ConfigMap::new();
		envelope.insert("cipher".into(), Value::String(CIPHER_NAME.into()));
		envelope.insert("kdf".into(), Value::String(KDF_NAME.into()));
		envelope.insert("salt".into(), Value::String(STANDARD.encode(salt)));
		envelope.insert("nonce".into(), Value::String(STANDARD.encode(nonce)));
		envelope.insert("ciphertext".into(), Value::String(STANDARD.encode(ciphertext)));

		let mut sealed = ConfigMap::new();
		sealed.insert(ENVELOPE_KEY.into(), Value::Object(envelope));
		Ok(sealed)
	}

	/// Decrypt an envelope produced by [`StateCipher::seal`].
	pub fn open(&self, envelope: &Value) -> Result<ConfigMap, CipherError> {
		let envelope = envelope
			.as_object()
			.ok_or_else(|| CipherError::Envelope("not a mapping".into()))?;

		let cipher_name = field(envelope, "cipher")?;
		let kdf_name = field(envelope, "kdf")?;
		if cipher_name != CIPHER_NAME || kdf_name != KDF_NAME {
			return Err(CipherError::Envelope(format!(
				"unsupported scheme {cipher_name}/{kdf_name}"
			)));
		}

		let salt = decode(envelope, "salt")?;
		let nonce = decode(envelope, "nonce")?;
		if nonce.len() != NONCE_SIZE {
			return Err(CipherError::Envelope(format!(
				"nonce is {} bytes, expected {NONCE_SIZE}",
				nonce.len()
			)));
		}
		let ciphertext = decode(envelope, "ciphertext")?;

		let key = self.derive(&salt)?;
		let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_slice()));
		let plaintext = Zeroizing::new(
			cipher
				.decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
				.map_err(|_| CipherError::Open)?,
		);

		match serde_json::from_slice(&plaintext) {
			Ok(Value::Object(map)) => Ok(map),
			Ok(_) => Err(CipherError::Envelope("plaintext is not a mapping".into())),
			Err(e) => Err(CipherError::Envelope(e.to_string())),
		}
	}
}

fn field<'a>(envelope: &'a ConfigMap, name: &str) -> Result<&'a str, CipherError> {
	envelope
		.get(name)
		.and_then(Value::as_str)
		.ok_or_else(|| CipherError::Envelope(format!("missing {name}")))
}

fn decode(envelope: &ConfigMap, name: &str) -> Result<Vec<u8>, CipherError> {
	STANDARD
		.decode(field(envelope, name)?)
		.map_err(|e| CipherError::Envelope(format!("{name}: {e}")))
}

/// The envelope of a sealed mapping, or `None` for plain state.
pub fn sealed_envelope(map: &ConfigMap) -> Option<&Value> {
	if map.len() == 1 {
		map.get(ENVELOPE_KEY)
	} else {
		None
	}
}

/// Encrypts every mapping before the inner saver writes it.
pub struct EncryptingSaver {
	inner: Arc<dyn ConfigurationSaver>,
	cipher: StateCipher,
}

impl EncryptingSaver {
	pub fn new(inner: Arc<dyn ConfigurationSaver>, cipher: StateCipher) -> Self {
		Self { inner, cipher }
	}
}

#[async_trait]
impl ConfigurationSaver for EncryptingSaver {
	fn name(&self) -> &'static str {
		"encrypting"
	}

	fn supports(&self, data: &ConfigMap, destination: &Path) -> bool {
		self.inner.supports(data, destination)
	}

	async fn save(&self, data: &ConfigMap, destination: &Path) -> Result<(), SaveError> {
		let identity = destination.display().to_string();
		let encrypt_error = |message: String| SaveError::Encrypt {
			identity: identity.clone(),
			message,
		};

		let cipher = self.cipher.clone();
		let data = data.clone();
		let sealed = tokio::task::spawn_blocking(move || cipher.seal(&data))
			.await
			.map_err(|e| encrypt_error(e.to_string()))?
			.map_err(|e| encrypt_error(e.to_string()))?;

		self.inner.save(&sealed, destination).await
	}

	async fn remove(&self, destination: &Path) -> Result<bool, SaveError> {
		self.inner.remove(destination).await
	}

	fn companions(&self, destination: &Path) -> Vec<PathBuf> {
		self.inner.companions(destination)
	}
}

/// Opens sealed state after the inner loader (normally a verifying one) has
/// read it. Plain state passes through unchanged; it is sealed on its next
/// save once a cipher is configured.
pub struct DecryptingLoader {
	inner: Arc<dyn ConfigurationLoader>,
	cipher: Option<StateCipher>,
}

impl DecryptingLoader {
	pub fn new(inner: Arc<dyn ConfigurationLoader>, cipher: Option<StateCipher>) -> Self {
		Self { inner, cipher }
	}
}

#[async_trait]
impl ConfigurationLoader for DecryptingLoader {
	fn name(&self) -> &'static str {
		"decrypting"
	}

	fn supports(&self, source: &ConfigurationSource) -> bool {
		self.inner.supports(source)
	}

	async fn load_from(&self, source: &ConfigurationSource) -> Result<ConfigMap, LoadError> {
		let map = self.inner.load_from(source).await?;
		let Some(envelope) = sealed_envelope(&map) else {
			if self.cipher.is_some() {
				debug!(source = %source, "state is not encrypted yet");
			}
			return Ok(map);
		};

		let identity = source.identity();
		let decrypt_error = |message: String| LoadError::Decrypt {
			identity: identity.clone(),
			message,
		};
		let Some(cipher) = self.cipher.clone() else {
			return Err(decrypt_error(
				"state is encrypted but no root passphrase is configured".into(),
			));
		};

		let envelope = envelope.clone();
		tokio::task::spawn_blocking(move || cipher.open(&envelope))
			.await
			.map_err(|e| decrypt_error(e.to_string()))?
			.map_err(|e| decrypt_error(e.to_string()))
	}
}
