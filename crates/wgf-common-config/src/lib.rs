// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User input for the federation control plane.
//!
//! Options are declared once in [`option::OPTIONS`] and resolved from layered
//! sources, lowest precedence first:
//!
//! 1. table defaults
//! 2. `/etc/wg-federation/config.toml`
//! 3. `$XDG_CONFIG_HOME/wg-federation/config.toml` (or `--config`)
//! 4. `WGF_*` environment variables
//! 5. command line flags
//!
//! The result is an immutable [`UserInput`] shared by every controller.

pub mod env;
mod error;
pub mod input;
pub mod layer;
pub mod option;
pub mod paths;
pub mod registry;
pub mod sources;

pub use env::{load_secret_env, EnvSnapshot, SecretEnvError, ENV_PREFIX};
pub use error::ConfigError;
pub use input::{LogFormat, LogLevel, SecretRetrievalMethod, StateFormat, UserInput};
pub use layer::InputLayer;
pub use option::{find_option, CommandLineOption, OptionKind, OPTIONS};
pub use paths::PathsConfig;
pub use registry::{InputRegistry, STATE_SIGNING_KEY_VAR};
pub use sources::{CliSource, DefaultsSource, EnvSource, FileSource, InputSource, Precedence};

use std::path::PathBuf;

/// Resolve user input from the standard source stack.
///
/// `config_file` replaces the user-level file when given and must exist.
pub fn resolve_user_input(
	env: EnvSnapshot,
	config_file: Option<PathBuf>,
	cli: InputLayer,
) -> Result<UserInput, ConfigError> {
	let mut registry = InputRegistry::new(env.clone());
	registry.register(Box::new(DefaultsSource));

	match config_file {
		Some(path) => registry.register(Box::new(FileSource::explicit(path))),
		None => {
			let paths = PathsConfig::discover()?;
			registry.register(Box::new(FileSource::system(paths.system_config_file)));
			registry.register(Box::new(FileSource::user(paths.user_config_file)));
		}
	}

	registry.register(Box::new(EnvSource::new(env)));
	registry.register(Box::new(CliSource::new(cli)));
	registry.resolve()
}
