// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration savers, destination classification and the saver registry.

mod file;
mod signing;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::atomic::atomic_write_async;
use crate::error::SaveError;
use crate::map::ConfigMap;

pub use file::{JsonFileSaver, TextFileSaver, TomlFileSaver, YamlFileSaver, LINE_SEPARATOR};
pub use signing::{
	digest_path, DigestAlgorithm, DigestRecord, Digester, SigningSaver, VerifyingLoader, DIGEST_SUFFIX,
};

/// Suffixes that mark a digest/signature side file.
pub const DIGEST_SUFFIXES: &[&str] = &[".digest", ".sig", ".signature", ".checksum", ".sha256"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestinationKind {
	Digest,
	Json,
	Toml,
	Yaml,
	Unknown,
}

/// Classify a destination by file name alone.
pub fn classify_destination(path: &Path) -> DestinationKind {
	let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
		return DestinationKind::Unknown;
	};
	let name = name.to_ascii_lowercase();

	if DIGEST_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
		DestinationKind::Digest
	} else if name.ends_with(".json") {
		DestinationKind::Json
	} else if name.ends_with(".toml") {
		DestinationKind::Toml
	} else if name.ends_with(".yaml") || name.ends_with(".yml") {
		DestinationKind::Yaml
	} else {
		DestinationKind::Unknown
	}
}

/// Persists a [`ConfigMap`] to one destination.
///
/// `save` is atomic: the destination holds either the full new content or
/// what it held before the call.
#[async_trait]
pub trait ConfigurationSaver: Send + Sync {
	fn name(&self) -> &'static str;

	fn supports(&self, data: &ConfigMap, destination: &Path) -> bool;

	async fn save(&self, data: &ConfigMap, destination: &Path) -> Result<(), SaveError>;

	/// Delete counterpart of `save`. Returns whether anything was removed.
	async fn remove(&self, destination: &Path) -> Result<bool, SaveError> {
		remove_file(destination).await
	}

	/// Files besides `destination` that `save` and `remove` write.
	fn companions(&self, _destination: &Path) -> Vec<PathBuf> {
		Vec::new()
	}
}

#[derive(Debug)]
enum Prior {
	Bytes(Vec<u8>),
	Missing,
	/// Could not be read; left as it is on restore.
	Unreadable,
}

/// Content of a set of files before they are written, so the write can be
/// undone.
#[derive(Debug)]
pub(crate) struct Snapshot {
	files: Vec<(PathBuf, Prior)>,
}

impl Snapshot {
	pub(crate) async fn take(paths: impl IntoIterator<Item = PathBuf>) -> Self {
		let mut files = Vec::new();
		for path in paths {
			let prior = match tokio::fs::read(&path).await {
				Ok(bytes) => Prior::Bytes(bytes),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => Prior::Missing,
				Err(_) => Prior::Unreadable,
			};
			files.push((path, prior));
		}
		Self { files }
	}

	/// Put every file back. Failures are logged; the caller is already
	/// reporting an error for this destination.
	pub(crate) async fn restore(self) {
		for (path, prior) in self.files {
			let result = match prior {
				Prior::Bytes(bytes) => atomic_write_async(path.clone(), bytes)
					.await
					.map_err(|e| e.to_string()),
				Prior::Missing => remove_file(&path).await.map(|_| ()).map_err(|e| e.to_string()),
				Prior::Unreadable => Ok(()),
			};
			if let Err(error) = result {
				warn!(path = %path.display(), %error, "failed to restore file");
			}
		}
	}
}

pub(crate) async fn remove_file(destination: &Path) -> Result<bool, SaveError> {
	match tokio::fs::remove_file(destination).await {
		Ok(()) => Ok(true),
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
		Err(e) => Err(SaveError::Remove {
			identity: destination.display().to_string(),
			source: e,
		}),
	}
}

/// Savers in priority order. The first whose `supports` is true wins.
pub struct SaverRegistry {
	savers: Vec<Arc<dyn ConfigurationSaver>>,
	timeout: Duration,
}

impl SaverRegistry {
	pub fn new(timeout: Duration) -> Self {
		Self {
			savers: Vec::new(),
			timeout,
		}
	}

	pub fn register(&mut self, saver: Arc<dyn ConfigurationSaver>) {
		debug!(saver = saver.name(), position = self.savers.len(), "registering saver");
		self.savers.push(saver);
	}

	pub fn select_saver(
		&self,
		data: &ConfigMap,
		destination: &Path,
	) -> Result<&Arc<dyn ConfigurationSaver>, SaveError> {
		self
			.savers
			.iter()
			.find(|saver| saver.supports(data, destination))
			.ok_or_else(|| SaveError::Unsupported {
				identity: destination.display().to_string(),
			})
	}

	#[instrument(skip_all, fields(destination = %destination.display()))]
	pub async fn save(&self, data: &ConfigMap, destination: &Path) -> Result<&'static str, SaveError> {
		let saver = Arc::clone(self.select_saver(data, destination)?);
		let name = saver.name();
		let work = {
			let saver = Arc::clone(&saver);
			let data = data.clone();
			let destination = destination.to_path_buf();
			async move { saver.save(&data, &destination).await }
		};
		self.bounded(saver.as_ref(), destination, work).await?;
		debug!(saver = name, "saved");
		Ok(name)
	}

	/// Remove through the saver that would have written `destination`.
	#[instrument(skip_all, fields(destination = %destination.display()))]
	pub async fn remove(&self, destination: &Path) -> Result<bool, SaveError> {
		let saver = Arc::clone(self.select_saver(&ConfigMap::new(), destination)?);
		let work = {
			let saver = Arc::clone(&saver);
			let destination = destination.to_path_buf();
			async move { saver.remove(&destination).await }
		};
		self.bounded(saver.as_ref(), destination, work).await
	}

	/// Run `work` on its own task under the registry timeout.
	///
	/// A blocking write cannot be interrupted halfway, so on timeout the task
	/// is allowed to finish and every file it may have touched is put back
	/// before the timeout is returned.
	async fn bounded<T, F>(
		&self,
		saver: &dyn ConfigurationSaver,
		destination: &Path,
		work: F,
	) -> Result<T, SaveError>
	where
		F: Future<Output = Result<T, SaveError>> + Send + 'static,
		T: Send + 'static,
	{
		let identity = destination.display().to_string();
		let touched = std::iter::once(destination.to_path_buf()).chain(saver.companions(destination));
		let snapshot = Snapshot::take(touched).await;

		let mut task = tokio::spawn(work);
		match tokio::time::timeout(self.timeout, &mut task).await {
			Ok(joined) => joined.map_err(|e| SaveError::Task {
				identity,
				message: e.to_string(),
			})?,
			Err(_) => {
				let late = task.await;
				debug!(completed = matches!(late, Ok(Ok(_))), "timed out write settled");
				snapshot.restore().await;
				Err(SaveError::Timeout {
					identity,
					timeout: self.timeout,
				})
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn classification_is_a_closed_suffix_set() {
		let cases = [
			("wg0.json", DestinationKind::Json),
			("wg0.TOML", DestinationKind::Toml),
			("wg0.json.digest", DestinationKind::Digest),
			("wg0.sig", DestinationKind::Digest),
			("wg0.signature", DestinationKind::Digest),
			("wg0.checksum", DestinationKind::Digest),
			("wg0.json.sha256", DestinationKind::Digest),
			("wg0.yaml", DestinationKind::Yaml),
			("wg0.yml", DestinationKind::Yaml),
			("wg0.ini", DestinationKind::Unknown),
			("digest", DestinationKind::Unknown),
			("wg0.digestive", DestinationKind::Unknown),
		];

		for (name, expected) in cases {
			assert_eq!(
				classify_destination(&PathBuf::from("/var/lib/wgf").join(name)),
				expected,
				"{name}"
			);
		}
	}

	#[test]
	fn root_has_no_kind() {
		assert_eq!(classify_destination(Path::new("/")), DestinationKind::Unknown);
	}

	#[tokio::test]
	async fn registry_picks_saver_by_destination() {
		let dir = tempfile::TempDir::new().unwrap();
		let mut registry = SaverRegistry::new(Duration::from_secs(5));
		registry.register(Arc::new(TextFileSaver));
		registry.register(Arc::new(JsonFileSaver));
		registry.register(Arc::new(TomlFileSaver));
		registry.register(Arc::new(YamlFileSaver));

		let mut data = ConfigMap::new();
		data.insert("interface".into(), "wg0".into());

		let used = registry.save(&data, &dir.path().join("wg0.toml")).await.unwrap();
		assert_eq!(used, "toml-file");
		let used = registry.save(&data, &dir.path().join("wg0.json")).await.unwrap();
		assert_eq!(used, "json-file");

		let used = registry.save(&data, &dir.path().join("wg0.yaml")).await.unwrap();
		assert_eq!(used, "yaml-file");

		let err = registry
			.save(&data, &dir.path().join("wg0.ini"))
			.await
			.unwrap_err();
		assert!(matches!(err, SaveError::Unsupported { .. }));
	}

	#[tokio::test]
	async fn remove_reports_whether_file_existed() {
		let dir = tempfile::TempDir::new().unwrap();
		let mut registry = SaverRegistry::new(Duration::from_secs(5));
		registry.register(Arc::new(JsonFileSaver));

		let path = dir.path().join("wg0.json");
		std::fs::write(&path, "{}").unwrap();

		assert!(registry.remove(&path).await.unwrap());
		assert!(!path.exists());
		assert!(!registry.remove(&path).await.unwrap());
	}

	/// Writes after a delay, like a blocking write stuck on slow storage.
	struct SlowJsonSaver {
		delay: Duration,
	}

	#[async_trait]
	impl ConfigurationSaver for SlowJsonSaver {
		fn name(&self) -> &'static str {
			"slow-json"
		}

		fn supports(&self, data: &ConfigMap, destination: &Path) -> bool {
			JsonFileSaver.supports(data, destination)
		}

		async fn save(&self, data: &ConfigMap, destination: &Path) -> Result<(), SaveError> {
			tokio::time::sleep(self.delay).await;
			JsonFileSaver.save(data, destination).await
		}
	}

	fn port(port: u16) -> ConfigMap {
		let mut data = ConfigMap::new();
		data.insert("interface".into(), "wg0".into());
		data.insert("listen_port".into(), port.into());
		data
	}

	fn signing_registry(timeout: Duration, delay: Duration, digester: &Digester) -> SaverRegistry {
		let mut registry = SaverRegistry::new(timeout);
		registry.register(Arc::new(SigningSaver::new(
			Arc::new(SlowJsonSaver { delay }),
			digester.clone(),
		)));
		registry
	}

	#[tokio::test]
	async fn timed_out_save_leaves_state_and_digest_as_they_were() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("wg0.json");
		let digester = Digester::new(None);

		signing_registry(Duration::from_secs(5), Duration::ZERO, &digester)
			.save(&port(51820), &path)
			.await
			.unwrap();
		let state_before = std::fs::read(&path).unwrap();
		let digest_before = std::fs::read(digest_path(&path)).unwrap();

		let err = signing_registry(Duration::from_millis(20), Duration::from_millis(200), &digester)
			.save(&port(51821), &path)
			.await
			.unwrap_err();
		assert!(matches!(err, SaveError::Timeout { .. }));

		// Long enough for any write still in flight to have landed.
		tokio::time::sleep(Duration::from_millis(300)).await;
		assert_eq!(std::fs::read(&path).unwrap(), state_before);
		assert_eq!(std::fs::read(digest_path(&path)).unwrap(), digest_before);
		digester.verify_file(&path).await.unwrap();
	}

	#[tokio::test]
	async fn timed_out_first_save_leaves_nothing_behind() {
		let dir = tempfile::TempDir::new().unwrap();
		let path = dir.path().join("wg0.json");
		let digester = Digester::new(None);

		let err = signing_registry(Duration::from_millis(20), Duration::from_millis(200), &digester)
			.save(&port(51820), &path)
			.await
			.unwrap_err();
		assert!(matches!(err, SaveError::Timeout { .. }));

		tokio::time::sleep(Duration::from_millis(300)).await;
		assert!(!path.exists());
		assert!(!digest_path(&path).exists());
	}
}
