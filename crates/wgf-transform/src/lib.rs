// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Moving configuration in and out of the control plane.
//!
//! - [`loader`]: sources (files, environment blocks, remote URLs) into a
//!   [`ConfigMap`], selected first-match from an ordered [`LoaderRegistry`]
//! - [`saver`]: a [`ConfigMap`] out to files, atomically, with digest side
//!   files maintained by [`SigningSaver`]
//! - [`encryption`]: optional sealing of persisted state under the root
//!   passphrase
//! - [`lock`]: the run lock on the state directory
//! - [`location`]: where each interface's state lives

pub mod atomic;
pub mod encryption;
mod error;
pub mod loader;
pub mod location;
pub mod lock;
mod map;
pub mod saver;
mod source;

pub use encryption::{DecryptingLoader, EncryptingSaver, StateCipher};
pub use error::{AtomicWriteError, LoadError, LockError, SaveError, UnsupportedSourceError};
pub use loader::{ConfigurationLoader, LoaderRegistry};
pub use location::StateLocation;
pub use lock::{LockMode, RunLock};
pub use map::ConfigMap;
pub use saver::{
	classify_destination, ConfigurationSaver, DestinationKind, Digester, SaverRegistry, SigningSaver,
	VerifyingLoader, DIGEST_SUFFIX,
};
pub use source::ConfigurationSource;

use std::sync::Arc;
use std::time::Duration;

use loader::{JsonFileLoader, TomlFileLoader, YamlFileLoader};
use saver::{JsonFileSaver, TextFileSaver, TomlFileSaver, YamlFileSaver};

/// Loaders for persisted state: structured files behind digest verification,
/// opened with `cipher` when the state is sealed.
pub fn state_loaders(
	timeout: Duration,
	digester: &Digester,
	cipher: Option<&StateCipher>,
) -> LoaderRegistry {
	let structured: [Arc<dyn ConfigurationLoader>; 3] = [
		Arc::new(TomlFileLoader),
		Arc::new(JsonFileLoader),
		Arc::new(YamlFileLoader),
	];

	let mut registry = LoaderRegistry::new(timeout);
	for loader in structured {
		let verified = Arc::new(VerifyingLoader::new(loader, digester.clone()));
		registry.register(Arc::new(DecryptingLoader::new(verified, cipher.cloned())));
	}
	registry
}

/// Savers for persisted state: signed structured files, sealed first when a
/// cipher is given, plus the bare text saver for digest destinations.
pub fn state_savers(
	timeout: Duration,
	digester: &Digester,
	cipher: Option<&StateCipher>,
) -> SaverRegistry {
	let structured: [Arc<dyn ConfigurationSaver>; 3] = [
		Arc::new(TomlFileSaver),
		Arc::new(JsonFileSaver),
		Arc::new(YamlFileSaver),
	];

	let mut registry = SaverRegistry::new(timeout);
	registry.register(Arc::new(TextFileSaver));
	for saver in structured {
		let signed: Arc<dyn ConfigurationSaver> = Arc::new(SigningSaver::new(saver, digester.clone()));
		match cipher {
			Some(cipher) => registry.register(Arc::new(EncryptingSaver::new(signed, cipher.clone()))),
			None => registry.register(signed),
		}
	}
	registry
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use tempfile::TempDir;
	use tokio_test::assert_ok;

	#[tokio::test]
	async fn state_registries_round_trip_with_digest() {
		let dir = TempDir::new().unwrap();
		let digester = Digester::new(None);
		let savers = state_savers(Duration::from_secs(5), &digester, None);
		let loaders = state_loaders(Duration::from_secs(5), &digester, None);
		let location = StateLocation::new(dir.path(), wgf_common_config::StateFormat::Toml);

		let mut data = ConfigMap::new();
		data.insert("interface".into(), json!("wg0"));
		data.insert("listen_port".into(), json!(51820));

		let path = location.config_path("wg0");
		assert_eq!(assert_ok!(savers.save(&data, &path).await), "signing");
		assert!(location.digest_path("wg0").exists());

		let (loaded, loader) = assert_ok!(loaders.load(&ConfigurationSource::File(path.clone())).await);
		assert_eq!(loader, "decrypting");
		assert_eq!(loaded, data);

		assert_ok!(savers.remove(&path).await);
		assert!(!location.digest_path("wg0").exists());
	}

	#[tokio::test]
	async fn sealed_state_is_signed_over_ciphertext() {
		let dir = TempDir::new().unwrap();
		let digester = Digester::new(None);
		let cipher = StateCipher::new(wgf_common_secret::SecretString::new("root".to_string()));
		let savers = state_savers(Duration::from_secs(5), &digester, Some(&cipher));
		let location = StateLocation::new(dir.path(), wgf_common_config::StateFormat::Yaml);

		let mut data = ConfigMap::new();
		data.insert("interface".into(), json!("wg0"));
		data.insert("listen_port".into(), json!(51820));

		let path = location.config_path("wg0");
		assert_eq!(assert_ok!(savers.save(&data, &path).await), "encrypting");
		assert_ok!(digester.verify_file(&path).await);
		assert!(!std::fs::read_to_string(&path).unwrap().contains("51820"));

		let source = ConfigurationSource::File(path);
		let loaders = state_loaders(Duration::from_secs(5), &digester, Some(&cipher));
		let (loaded, _) = assert_ok!(loaders.load(&source).await);
		assert_eq!(loaded, data);

		let locked = state_loaders(Duration::from_secs(5), &digester, None);
		assert!(matches!(
			locked.load(&source).await,
			Err(LoadError::Decrypt { .. })
		));
	}
}
