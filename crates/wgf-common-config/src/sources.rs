// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Option sources: defaults, TOML files, environment, command line.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::env::EnvSnapshot;
use crate::layer::InputLayer;
use crate::option::OPTIONS;
use crate::ConfigError;

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	SystemFile = 20,
	UserFile = 30,
	Environment = 50,
	Cli = 60,
}

pub trait InputSource: Send + Sync {
	/// Name for logging
	fn name(&self) -> &'static str;

	fn precedence(&self) -> Precedence;

	fn load(&self) -> Result<InputLayer, ConfigError>;
}

/// Defaults declared in the option table.
pub struct DefaultsSource;

impl InputSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<InputLayer, ConfigError> {
		let mut layer = InputLayer::default();
		for option in OPTIONS {
			if let Some(default) = option.default {
				layer.set_raw(option.name, default)?;
			}
		}
		Ok(layer)
	}
}

/// TOML option file. A missing file contributes nothing.
pub struct FileSource {
	path: PathBuf,
	precedence: Precedence,
	name: &'static str,
	required: bool,
}

impl FileSource {
	pub fn system(path: PathBuf) -> Self {
		Self {
			path,
			precedence: Precedence::SystemFile,
			name: "system-config",
			required: false,
		}
	}

	pub fn user(path: PathBuf) -> Self {
		Self {
			path,
			precedence: Precedence::UserFile,
			name: "user-config",
			required: false,
		}
	}

	/// File named explicitly with `--config`; it must exist.
	pub fn explicit(path: PathBuf) -> Self {
		Self {
			path,
			precedence: Precedence::UserFile,
			name: "explicit-config",
			required: true,
		}
	}
}

impl InputSource for FileSource {
	fn name(&self) -> &'static str {
		self.name
	}

	fn precedence(&self) -> Precedence {
		self.precedence
	}

	fn load(&self) -> Result<InputLayer, ConfigError> {
		if !self.required && !self.path.exists() {
			debug!(path = %self.path.display(), source = self.name, "option file not found, skipping");
			return Ok(InputLayer::default());
		}

		debug!(path = %self.path.display(), source = self.name, "loading option file");

		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;
		let layer: InputLayer = toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
			path: self.path.clone(),
			source: e,
		})?;

		for option in OPTIONS {
			if let Some(raw) = option_as_raw(&layer, option.name) {
				option.check(&raw)?;
			}
		}

		trace!(source = self.name, "parsed option layer");
		Ok(layer)
	}
}

/// Raw form of the scalar options a file can carry, for the shared checks.
fn option_as_raw(layer: &InputLayer, name: &str) -> Option<String> {
	match name {
		"state_dir" => layer.state_dir.as_ref().map(|p| p.display().to_string()),
		"io_timeout_secs" => layer.io_timeout_secs.map(|s| s.to_string()),
		"audit_interval_secs" => layer.audit_interval_secs.map(|s| s.to_string()),
		"root_passphrase_command" => layer.root_passphrase_command.clone(),
		"apply_command" => layer.apply_command.clone(),
		_ => None,
	}
}

/// `WGF_<OPTION>` environment variables.
pub struct EnvSource {
	env: EnvSnapshot,
}

impl EnvSource {
	pub fn new(env: EnvSnapshot) -> Self {
		Self { env }
	}
}

impl InputSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<InputLayer, ConfigError> {
		debug!("loading environment variables");
		let mut layer = InputLayer::default();
		for option in OPTIONS {
			let var = option.env_var();
			if let Some(raw) = self.env.get(&var) {
				trace!(var = %var, "option set from environment");
				layer.set_raw(option.name, &raw)?;
			}
		}
		Ok(layer)
	}
}

/// Values parsed from the command line by the binary.
pub struct CliSource {
	layer: InputLayer,
}

impl CliSource {
	pub fn new(layer: InputLayer) -> Self {
		Self { layer }
	}
}

impl InputSource for CliSource {
	fn name(&self) -> &'static str {
		"cli"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Cli
	}

	fn load(&self) -> Result<InputLayer, ConfigError> {
		Ok(self.layer.clone())
	}
}
