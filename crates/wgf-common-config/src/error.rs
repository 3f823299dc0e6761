// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Option resolution error types.

use std::path::PathBuf;

use crate::env::SecretEnvError;

/// Errors raised while resolving or validating user input.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// I/O error reading the config file
	#[error("I/O error reading {path}: {source}")]
	FileRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// TOML parsing error
	#[error("TOML parse error in {path}: {source}")]
	TomlParse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	/// A single option carried a value it cannot accept
	#[error("Invalid value for {option}: {message}")]
	InvalidValue { option: String, message: String },

	/// Cross-option rule violated
	#[error("Validation error: {0}")]
	Validation(String),

	#[error("Secret error: {0}")]
	Secret(#[from] SecretEnvError),

	#[error("Could not determine home directory")]
	HomeDirNotFound,
}

impl ConfigError {
	pub fn validation(msg: impl Into<String>) -> Self {
		Self::Validation(msg.into())
	}

	pub fn invalid_value(option: impl Into<String>, message: impl Into<String>) -> Self {
		Self::InvalidValue {
			option: option.into(),
			message: message.into(),
		}
	}
}
