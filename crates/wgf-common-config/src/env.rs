// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! Environment helpers: the `VAR` / `VAR_FILE` secret convention and an
//! environment snapshot that option sources read from.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use wgf_common_secret::SecretString;

/// Prefix shared by every environment variable the control plane reads.
pub const ENV_PREFIX: &str = "WGF_";

#[derive(Debug, Error)]
pub enum SecretEnvError {
	#[error("failed to read secret file at {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("secret file path in {var} is empty")]
	EmptyPath { var: String },
}

/// A frozen copy of the process environment.
///
/// Sources read from a snapshot instead of calling `std::env` directly so that
/// resolution is deterministic and tests never mutate the real environment.
#[derive(Debug, Clone, Default)]
pub struct EnvSnapshot {
	vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
	pub fn capture() -> Self {
		Self::from_vars(std::env::vars())
	}

	pub fn from_vars<I, K, V>(vars: I) -> Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: Into<String>,
		V: Into<String>,
	{
		Self {
			vars: vars
				.into_iter()
				.map(|(k, v)| (k.into(), v.into()))
				.collect(),
		}
	}

	/// Non-empty, trimmed value of `name`.
	pub fn get(&self, name: &str) -> Option<String> {
		self
			.vars
			.get(name)
			.map(|v| v.trim().to_string())
			.filter(|v| !v.is_empty())
	}

	/// All variables starting with `prefix`, in sorted key order.
	pub fn with_prefix<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = (&'a str, &'a str)> {
		self
			.vars
			.range(prefix.to_string()..)
			.take_while(move |(k, _)| k.starts_with(prefix))
			.map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// Load a secret using the `VAR` / `VAR_FILE` convention; `VAR_FILE` wins.
	/// A single trailing newline is stripped from file contents.
	pub fn secret(&self, var: &str) -> Result<Option<SecretString>, SecretEnvError> {
		let file_var = format!("{var}_FILE");

		if let Some(path_str) = self.vars.get(&file_var) {
			if path_str.is_empty() {
				return Err(SecretEnvError::EmptyPath { var: file_var });
			}

			let path = PathBuf::from(path_str);
			let content = fs::read_to_string(&path).map_err(|e| SecretEnvError::Io {
				path: path.clone(),
				source: e,
			})?;

			let secret = content.strip_suffix('\n').unwrap_or(&content).to_string();
			return Ok(Some(SecretString::new(secret)));
		}

		Ok(self.vars.get(var).cloned().map(SecretString::new))
	}
}

/// Load a secret from the live process environment.
pub fn load_secret_env(var: &str) -> Result<Option<SecretString>, SecretEnvError> {
	EnvSnapshot::capture().secret(var)
}
