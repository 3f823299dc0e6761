// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration loaders and the ordered registry that picks one per source.

mod env;
mod file;
mod remote;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::{LoadError, UnsupportedSourceError};
use crate::map::ConfigMap;
use crate::source::ConfigurationSource;

pub use env::EnvLoader;
pub use file::{JsonFileLoader, TextFileLoader, TomlFileLoader, YamlFileLoader};
pub use remote::RemoteLoader;

/// Pulls one source into a [`ConfigMap`].
///
/// `supports` must be cheap and side-effect free. `load_from` never returns a
/// partially populated mapping and never caches.
#[async_trait]
pub trait ConfigurationLoader: Send + Sync {
	fn name(&self) -> &'static str;

	fn supports(&self, source: &ConfigurationSource) -> bool;

	async fn load_from(&self, source: &ConfigurationSource) -> Result<ConfigMap, LoadError>;
}

/// Loaders in priority order. The first whose `supports` is true wins.
pub struct LoaderRegistry {
	loaders: Vec<Arc<dyn ConfigurationLoader>>,
	timeout: Duration,
}

impl LoaderRegistry {
	pub fn new(timeout: Duration) -> Self {
		Self {
			loaders: Vec::new(),
			timeout,
		}
	}

	/// The loaders used for interface sources: TOML, JSON, YAML, environment,
	/// remote.
	pub fn for_sources(timeout: Duration, env: wgf_common_config::EnvSnapshot) -> Self {
		let mut registry = Self::new(timeout);
		registry.register(Arc::new(TomlFileLoader));
		registry.register(Arc::new(JsonFileLoader));
		registry.register(Arc::new(YamlFileLoader));
		registry.register(Arc::new(EnvLoader::new(env)));
		registry.register(Arc::new(RemoteLoader::new(timeout)));
		registry
	}

	pub fn register(&mut self, loader: Arc<dyn ConfigurationLoader>) {
		debug!(loader = loader.name(), position = self.loaders.len(), "registering loader");
		self.loaders.push(loader);
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	pub fn len(&self) -> usize {
		self.loaders.len()
	}

	pub fn is_empty(&self) -> bool {
		self.loaders.is_empty()
	}

	pub fn select_loader(
		&self,
		source: &ConfigurationSource,
	) -> Result<&Arc<dyn ConfigurationLoader>, UnsupportedSourceError> {
		self
			.loaders
			.iter()
			.find(|loader| loader.supports(source))
			.ok_or_else(|| UnsupportedSourceError {
				identity: source.identity(),
			})
	}

	/// Select a loader and run it under the registry timeout. Returns the
	/// mapping and the name of the loader that produced it.
	#[instrument(skip_all, fields(source = %source))]
	pub async fn load(&self, source: &ConfigurationSource) -> Result<(ConfigMap, &'static str), LoadError> {
		let loader = self.select_loader(source)?;
		debug!(loader = loader.name(), "loader selected");

		let map = tokio::time::timeout(self.timeout, loader.load_from(source))
			.await
			.map_err(|_| LoadError::Timeout {
				identity: source.identity(),
				timeout: self.timeout,
			})??;

		Ok((map, loader.name()))
	}
}
