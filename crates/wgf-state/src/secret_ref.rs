// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Opaque handle to an interface private key.
//!
//! The key material itself only enters the process when the WireGuard apply
//! step asks for it. Source and state files carry one of:
//!
//! - `file:/etc/wireguard/wg0.key`
//! - `env:WG0_PRIVATE_KEY`
//! - `command:pass show wg/wg0`
//! - `cleartext:<base64>`, or a bare base64 key (test deployments only)

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use wgf_common_config::SecretRetrievalMethod;
use wgf_common_secret::SecretString;

use crate::keys::{is_valid_key_encoding, KeyError, WgPrivateKey};

#[derive(Debug, Error)]
pub enum SecretRefError {
	#[error("unrecognized private key reference (expected file:, env:, command: or cleartext:)")]
	Unrecognized,

	#[error("private key reference '{0}' has an empty target")]
	EmptyTarget(&'static str),

	#[error("failed to read private key file {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("environment variable {0} is not set")]
	MissingEnv(String),

	#[error("private key command failed: {0}")]
	Command(String),

	#[error(transparent)]
	Key(#[from] KeyError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivateKeyRef {
	File(PathBuf),
	Env(String),
	Command(String),
	Cleartext(SecretString),
}

impl PrivateKeyRef {
	pub fn parse(raw: &str) -> Result<Self, SecretRefError> {
		let raw = raw.trim();
		let (scheme, target) = match raw.split_once(':') {
			Some((scheme, target)) => (scheme, target.trim()),
			None if is_valid_key_encoding(raw) => return Ok(Self::Cleartext(SecretString::new(raw.to_string()))),
			None => return Err(SecretRefError::Unrecognized),
		};

		let (name, make): (&'static str, fn(&str) -> Self) = match scheme {
			"file" => ("file", |t| Self::File(PathBuf::from(t))),
			"env" => ("env", |t| Self::Env(t.to_string())),
			"command" => ("command", |t| Self::Command(t.to_string())),
			"cleartext" => ("cleartext", |t| Self::Cleartext(SecretString::new(t.to_string()))),
			_ => return Err(SecretRefError::Unrecognized),
		};

		if target.is_empty() {
			return Err(SecretRefError::EmptyTarget(name));
		}
		Ok(make(target))
	}

	pub fn scheme(&self) -> &'static str {
		match self {
			PrivateKeyRef::File(_) => "file",
			PrivateKeyRef::Env(_) => "env",
			PrivateKeyRef::Command(_) => "command",
			PrivateKeyRef::Cleartext(_) => "cleartext",
		}
	}

	pub fn is_cleartext(&self) -> bool {
		matches!(self, PrivateKeyRef::Cleartext(_))
	}

	/// Whether `method` permits this form of reference.
	pub fn allowed_by(&self, method: SecretRetrievalMethod) -> bool {
		!self.is_cleartext() || method.allows_cleartext()
	}

	/// Cleartext keys decode in place; other forms need [`Self::resolve`].
	pub fn cleartext_key(&self) -> Option<Result<WgPrivateKey, KeyError>> {
		match self {
			PrivateKeyRef::Cleartext(secret) => Some(WgPrivateKey::from_base64(secret.expose())),
			_ => None,
		}
	}

	/// Fetch the key material.
	pub async fn resolve(&self) -> Result<WgPrivateKey, SecretRefError> {
		let encoded = match self {
			PrivateKeyRef::File(path) => tokio::fs::read_to_string(path)
				.await
				.map_err(|e| SecretRefError::Io {
					path: path.clone(),
					source: e,
				})
				.map(SecretString::new)?,
			PrivateKeyRef::Env(var) => std::env::var(var)
				.map(SecretString::new)
				.map_err(|_| SecretRefError::MissingEnv(var.clone()))?,
			PrivateKeyRef::Command(command) => {
				let output = tokio::process::Command::new("sh")
					.arg("-c")
					.arg(command)
					.output()
					.await
					.map_err(|e| SecretRefError::Command(e.to_string()))?;
				if !output.status.success() {
					return Err(SecretRefError::Command(format!("exited with {}", output.status)));
				}
				SecretString::new(String::from_utf8_lossy(&output.stdout).into_owned())
			}
			PrivateKeyRef::Cleartext(secret) => secret.clone(),
		};

		Ok(WgPrivateKey::from_base64(encoded.expose())?)
	}
}

impl fmt::Display for PrivateKeyRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PrivateKeyRef::File(path) => write!(f, "file:{}", path.display()),
			PrivateKeyRef::Env(var) => write!(f, "env:{var}"),
			PrivateKeyRef::Command(command) => write!(f, "command:{command}"),
			PrivateKeyRef::Cleartext(secret) => write!(f, "cleartext:{secret}"),
		}
	}
}

impl Serialize for PrivateKeyRef {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match self {
			// Persisted state must round-trip; only test deployments use this form.
			PrivateKeyRef::Cleartext(secret) => serializer.serialize_str(&format!("cleartext:{}", secret.expose())),
			other => serializer.serialize_str(&other.to_string()),
		}
	}
}

impl<'de> Deserialize<'de> for PrivateKeyRef {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let raw = String::deserialize(deserializer)?;
		Self::parse(&raw).map_err(serde::de::Error::custom)
	}
}
