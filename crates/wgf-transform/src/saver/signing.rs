// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Digest side files for persisted state.
//!
//! [`SigningSaver`] writes the state file, digests the exact bytes on disk and
//! writes `<file>.digest` through the text saver. [`VerifyingLoader`] refuses to
//! hand back state whose digest no longer matches.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use wgf_common_secret::SecretString;

use super::{classify_destination, remove_file, ConfigurationSaver, DestinationKind, Snapshot, TextFileSaver};
use crate::error::{LoadError, SaveError};
use crate::loader::{ConfigurationLoader, TextFileLoader};
use crate::map::ConfigMap;
use crate::source::ConfigurationSource;

type HmacSha256 = Hmac<Sha256>;

/// Suffix of the digest files this crate writes.
pub const DIGEST_SUFFIX: &str = ".digest";

/// `<file>.digest` next to `path`.
pub fn digest_path(path: &Path) -> PathBuf {
	let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
	name.push(DIGEST_SUFFIX);
	path.with_file_name(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
	Sha256,
	HmacSha256,
}

impl DigestAlgorithm {
	pub fn as_str(&self) -> &'static str {
		match self {
			DigestAlgorithm::Sha256 => "sha256",
			DigestAlgorithm::HmacSha256 => "hmac-sha256",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"sha256" => Some(DigestAlgorithm::Sha256),
			"hmac-sha256" => Some(DigestAlgorithm::HmacSha256),
			_ => None,
		}
	}
}

impl fmt::Display for DigestAlgorithm {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Content of a digest file: the hex digest on the first line, the algorithm
/// on the second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestRecord {
	pub digest: String,
	pub algorithm: DigestAlgorithm,
}

impl DigestRecord {
	pub fn to_map(&self) -> ConfigMap {
		let mut map = ConfigMap::new();
		map.insert("digest".to_string(), Value::String(self.digest.clone()));
		map.insert(
			"algorithm".to_string(),
			Value::String(self.algorithm.as_str().to_string()),
		);
		map
	}

	/// Parse the mapping produced by [`TextFileLoader`].
	pub fn from_lines(map: &ConfigMap, identity: &str) -> Result<Self, LoadError> {
		let line = |i: usize| map.get(&i.to_string()).and_then(Value::as_str);

		let digest = line(0)
			.filter(|d| !d.is_empty())
			.ok_or_else(|| LoadError::parse(identity, "digest file has no digest line"))?;
		let algorithm = line(1)
			.and_then(DigestAlgorithm::parse)
			.ok_or_else(|| LoadError::parse(identity, "digest file has no known algorithm line"))?;

		Ok(Self {
			digest: digest.to_string(),
			algorithm,
		})
	}
}

/// Computes and checks digests, keyed (HMAC-SHA256) when a signing key is
/// configured and plain SHA-256 otherwise.
#[derive(Clone, Default)]
pub struct Digester {
	mac: Option<HmacSha256>,
}

impl fmt::Debug for Digester {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Digester")
			.field("algorithm", &self.algorithm())
			.finish()
	}
}

impl Digester {
	pub fn new(key: Option<&SecretString>) -> Self {
		// HMAC accepts keys of any length.
		let mac = key.and_then(|k| HmacSha256::new_from_slice(k.expose().as_bytes()).ok());
		Self { mac }
	}

	pub fn algorithm(&self) -> DigestAlgorithm {
		if self.mac.is_some() {
			DigestAlgorithm::HmacSha256
		} else {
			DigestAlgorithm::Sha256
		}
	}

	pub fn digest(&self, bytes: &[u8]) -> DigestRecord {
		let digest = match &self.mac {
			Some(mac) => {
				let mut mac = mac.clone();
				mac.update(bytes);
				hex::encode(mac.finalize().into_bytes())
			}
			None => hex::encode(Sha256::digest(bytes)),
		};
		DigestRecord {
			digest,
			algorithm: self.algorithm(),
		}
	}

	pub fn check(&self, bytes: &[u8], record: &DigestRecord, identity: &str) -> Result<(), LoadError> {
		let mismatch = |actual: String| LoadError::DigestMismatch {
			identity: identity.to_string(),
			expected: record.digest.clone(),
			actual,
		};

		if record.algorithm != self.algorithm() {
			return Err(mismatch(format!(
				"{} digest (state was written with {})",
				self.algorithm(),
				record.algorithm
			)));
		}

		match &self.mac {
			Some(mac) => {
				let expected = hex::decode(&record.digest).map_err(|_| mismatch("non-hex digest".to_string()))?;
				let mut mac = mac.clone();
				mac.update(bytes);
				mac.verify_slice(&expected)
					.map_err(|_| mismatch(self.digest(bytes).digest))
			}
			None => {
				let actual = self.digest(bytes).digest;
				if actual == record.digest {
					Ok(())
				} else {
					Err(mismatch(actual))
				}
			}
		}
	}

	/// Check a persisted file against its digest sibling.
	pub async fn verify_file(&self, path: &Path) -> Result<(), LoadError> {
		let identity = path.display().to_string();
		let digest_source = ConfigurationSource::File(digest_path(path));

		if !TextFileLoader.supports(&digest_source) {
			return Err(LoadError::DigestMissing { identity });
		}

		let lines = TextFileLoader.load_from(&digest_source).await?;
		let record = DigestRecord::from_lines(&lines, &digest_source.identity())?;
		let bytes = tokio::fs::read(path).await.map_err(|e| LoadError::Io {
			identity: identity.clone(),
			source: e,
		})?;

		self.check(&bytes, &record, &identity)
	}
}

/// Wraps a structured saver and maintains the digest sibling of everything it
/// writes. If the digest cannot be written the previous state file content is
/// restored, so the pair never disagrees.
pub struct SigningSaver {
	inner: Arc<dyn ConfigurationSaver>,
	digest_saver: TextFileSaver,
	digester: Digester,
}

impl SigningSaver {
	pub fn new(inner: Arc<dyn ConfigurationSaver>, digester: Digester) -> Self {
		Self {
			inner,
			digest_saver: TextFileSaver,
			digester,
		}
	}
}

#[async_trait]
impl ConfigurationSaver for SigningSaver {
	fn name(&self) -> &'static str {
		"signing"
	}

	fn supports(&self, data: &ConfigMap, destination: &Path) -> bool {
		classify_destination(destination) != DestinationKind::Digest && self.inner.supports(data, destination)
	}

	async fn save(&self, data: &ConfigMap, destination: &Path) -> Result<(), SaveError> {
		let identity = destination.display().to_string();
		let previous = Snapshot::take([destination.to_path_buf()]).await;

		self.inner.save(data, destination).await?;

		let written = match tokio::fs::read(destination).await {
			Ok(bytes) => bytes,
			Err(e) => {
				previous.restore().await;
				return Err(SaveError::Digest {
					identity,
					message: e.to_string(),
				});
			}
		};

		let record = self.digester.digest(&written);
		let sibling = digest_path(destination);
		if let Err(e) = self.digest_saver.save(&record.to_map(), &sibling).await {
			warn!(destination = %identity, error = %e, "digest write failed, restoring state");
			previous.restore().await;
			return Err(SaveError::Digest {
				identity,
				message: e.to_string(),
			});
		}

		debug!(destination = %identity, algorithm = %record.algorithm, "state signed");
		Ok(())
	}

	async fn remove(&self, destination: &Path) -> Result<bool, SaveError> {
		let removed = self.inner.remove(destination).await?;
		remove_file(&digest_path(destination)).await?;
		Ok(removed)
	}

	fn companions(&self, destination: &Path) -> Vec<PathBuf> {
		let mut files = self.inner.companions(destination);
		files.push(digest_path(destination));
		files
	}
}

/// Wraps a loader for persisted state and checks the digest sibling first.
pub struct VerifyingLoader {
	inner: Arc<dyn ConfigurationLoader>,
	digester: Digester,
}

impl VerifyingLoader {
	pub fn new(inner: Arc<dyn ConfigurationLoader>, digester: Digester) -> Self {
		Self { inner, digester }
	}
}

#[async_trait]
impl ConfigurationLoader for VerifyingLoader {
	fn name(&self) -> &'static str {
		"verifying"
	}

	fn supports(&self, source: &ConfigurationSource) -> bool {
		self.inner.supports(source)
	}

	async fn load_from(&self, source: &ConfigurationSource) -> Result<ConfigMap, LoadError> {
		if let Some(path) = source.path() {
			self.digester.verify_file(path).await?;
		}
		self.inner.load_from(source).await
	}
}
