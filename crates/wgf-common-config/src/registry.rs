// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Input registry - orders sources and merges their layers.

use tracing::{debug, info, warn};

use crate::env::EnvSnapshot;
use crate::input::UserInput;
use crate::layer::InputLayer;
use crate::sources::InputSource;
use crate::ConfigError;

/// Secret keying the persisted-state digests.
pub const STATE_SIGNING_KEY_VAR: &str = "WGF_STATE_SIGNING_KEY";

pub struct InputRegistry {
	sources: Vec<Box<dyn InputSource>>,
	env: EnvSnapshot,
}

impl InputRegistry {
	pub fn new(env: EnvSnapshot) -> Self {
		Self {
			sources: Vec::new(),
			env,
		}
	}

	pub fn register(&mut self, source: Box<dyn InputSource>) {
		debug!(source = source.name(), precedence = ?source.precedence(), "registering input source");
		self.sources.push(source);
	}

	pub fn source_count(&self) -> usize {
		self.sources.len()
	}

	/// Load every source lowest precedence first, merge, finalize and validate.
	/// Any source error aborts resolution.
	pub fn resolve(&self) -> Result<UserInput, ConfigError> {
		let mut sorted: Vec<_> = self.sources.iter().collect();
		sorted.sort_by_key(|s| s.precedence());

		let mut merged = InputLayer::default();
		for source in sorted {
			let layer = source.load().map_err(|e| {
				warn!(source = source.name(), error = %e, "input source failed");
				e
			})?;
			debug!(source = source.name(), "merging input layer");
			merged.merge(layer);
		}

		let mut input = merged.finalize()?;
		input.state_signing_key = self.env.secret(STATE_SIGNING_KEY_VAR)?;
		input.validate()?;

		if input.private_key_retrieval_method.allows_cleartext() {
			warn!(
				method = %input.private_key_retrieval_method,
				"private keys are read in clear text; never use this outside of tests"
			);
		}

		info!(
			state_dir = %input.state_dir.display(),
			source_dirs = input.source_dirs.len(),
			sources = input.sources.len(),
			state_format = ?input.state_format,
			signed_state = input.state_signing_key.is_some(),
			"user input resolved"
		);

		Ok(input)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::input::LogLevel;
	use crate::sources::{CliSource, DefaultsSource, EnvSource, FileSource};
	use std::io::Write;
	use std::path::PathBuf;

	fn registry_with(env: EnvSnapshot, file: Option<PathBuf>, cli: InputLayer) -> InputRegistry {
		let mut registry = InputRegistry::new(env.clone());
		registry.register(Box::new(CliSource::new(cli)));
		registry.register(Box::new(EnvSource::new(env)));
		if let Some(path) = file {
			registry.register(Box::new(FileSource::explicit(path)));
		}
		registry.register(Box::new(DefaultsSource));
		registry
	}

	#[test]
	fn precedence_is_defaults_file_env_cli() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(
			file,
			"state_dir = \"/from/file\"\nsource_dirs = [\"/src\"]\nlog_level = \"error\"\nio_timeout_secs = 5"
		)
		.unwrap();

		let env = EnvSnapshot::from_vars([("WGF_LOG_LEVEL", "warn"), ("WGF_STATE_DIR", "/from/env")]);
		let cli = InputLayer {
			state_dir: Some(PathBuf::from("/from/cli")),
			..Default::default()
		};

		let input = registry_with(env, Some(file.path().to_path_buf()), cli)
			.resolve()
			.unwrap();

		assert_eq!(input.state_dir, PathBuf::from("/from/cli"));
		assert_eq!(input.log_level, LogLevel::Warn);
		assert_eq!(input.io_timeout.as_secs(), 5);
		assert_eq!(input.source_dirs, vec![PathBuf::from("/src")]);
	}

	#[test]
	fn missing_required_option_fails() {
		let registry = registry_with(EnvSnapshot::default(), None, InputLayer::default());
		assert!(registry.resolve().is_err());
	}

	#[test]
	fn signing_key_is_picked_up_from_env() {
		let env = EnvSnapshot::from_vars([
			("WGF_STATE_DIR", "/state"),
			("WGF_SOURCES", "env:WGF_IFACE_"),
			("WGF_STATE_SIGNING_KEY", "s3cret"),
		]);
		let input = registry_with(env, None, InputLayer::default())
			.resolve()
			.unwrap();

		let key = input.state_signing_key.unwrap();
		assert_eq!(key.expose(), "s3cret");
		assert_eq!(input.sources, vec!["env:WGF_IFACE_".to_string()]);
	}

	#[test]
	fn invalid_env_value_aborts() {
		let env = EnvSnapshot::from_vars([("WGF_STATE_DIR", "/state"), ("WGF_IO_TIMEOUT_SECS", "0")]);
		let err = registry_with(env, None, InputLayer::default())
			.resolve()
			.unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { .. }));
	}
}
