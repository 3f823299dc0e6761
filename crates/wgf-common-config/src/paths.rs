// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Well-known filesystem locations.

use std::path::PathBuf;

use crate::ConfigError;

const APP_DIR: &str = "wg-federation";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathsConfig {
	/// `$XDG_CONFIG_HOME/wg-federation/config.toml`
	pub user_config_file: PathBuf,
	/// `/etc/wg-federation/config.toml`
	pub system_config_file: PathBuf,
	/// Suggested state directory when none is configured by an operator.
	pub default_state_dir: PathBuf,
}

impl PathsConfig {
	pub fn discover() -> Result<Self, ConfigError> {
		let config_dir = dirs::config_dir().ok_or(ConfigError::HomeDirNotFound)?;
		let state_base = dirs::state_dir()
			.or_else(dirs::data_local_dir)
			.ok_or(ConfigError::HomeDirNotFound)?;

		Ok(Self {
			user_config_file: config_dir.join(APP_DIR).join("config.toml"),
			system_config_file: PathBuf::from("/etc").join(APP_DIR).join("config.toml"),
			default_state_dir: state_base.join(APP_DIR),
		})
	}
}
