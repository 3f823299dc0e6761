// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The resolved, immutable user input handed to every controller.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use wgf_common_secret::SecretString;

use crate::option::{self, CommandLineOption};
use crate::ConfigError;

/// Parse a value of one of the closed option enums, reporting the option name
/// on failure.
fn parse_choice<T>(option: &CommandLineOption, raw: &str, table: &[(&str, T)]) -> Result<T, ConfigError>
where
	T: Copy,
{
	option.check(raw)?;
	table
		.iter()
		.find(|(name, _)| name.eq_ignore_ascii_case(raw))
		.map(|(_, value)| *value)
		.ok_or_else(|| ConfigError::invalid_value(option.name, format!("unsupported value '{raw}'")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateFormat {
	#[default]
	Json,
	Toml,
	Yaml,
}

impl StateFormat {
	pub fn extension(&self) -> &'static str {
		match self {
			StateFormat::Json => "json",
			StateFormat::Toml => "toml",
			StateFormat::Yaml => "yaml",
		}
	}
}

impl FromStr for StateFormat {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		parse_choice(
			&option::STATE_FORMAT,
			s,
			&[
				("json", StateFormat::Json),
				("toml", StateFormat::Toml),
				("yaml", StateFormat::Yaml),
			],
		)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
	Trace,
	Debug,
	#[default]
	Info,
	Warn,
	Error,
}

impl LogLevel {
	pub fn as_filter(&self) -> &'static str {
		match self {
			LogLevel::Trace => "trace",
			LogLevel::Debug => "debug",
			LogLevel::Info => "info",
			LogLevel::Warn => "warn",
			LogLevel::Error => "error",
		}
	}
}

impl FromStr for LogLevel {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		parse_choice(
			&option::LOG_LEVEL,
			s,
			&[
				("trace", LogLevel::Trace),
				("debug", LogLevel::Debug),
				("info", LogLevel::Info),
				("warn", LogLevel::Warn),
				("error", LogLevel::Error),
			],
		)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Pretty,
	Json,
}

impl FromStr for LogFormat {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		parse_choice(
			&option::LOG_FORMAT,
			s,
			&[("pretty", LogFormat::Pretty), ("json", LogFormat::Json)],
		)
	}
}

/// How the private key of an interface is handed to WireGuard at apply time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretRetrievalMethod {
	/// Key material lives in the source files in clear text. Testing only.
	TestInsecureCleartext,
	#[default]
	WgFederationEnvVar,
	WgFederationCommand,
}

impl SecretRetrievalMethod {
	pub fn as_str(&self) -> &'static str {
		match self {
			SecretRetrievalMethod::TestInsecureCleartext => "test-insecure-cleartext",
			SecretRetrievalMethod::WgFederationEnvVar => "wg-federation-env-var",
			SecretRetrievalMethod::WgFederationCommand => "wg-federation-command",
		}
	}

	pub fn allows_cleartext(&self) -> bool {
		matches!(self, SecretRetrievalMethod::TestInsecureCleartext)
	}
}

impl fmt::Display for SecretRetrievalMethod {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for SecretRetrievalMethod {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		parse_choice(
			&option::PRIVATE_KEY_RETRIEVAL_METHOD,
			s,
			&[
				(
					"test-insecure-cleartext",
					SecretRetrievalMethod::TestInsecureCleartext,
				),
				(
					"wg-federation-env-var",
					SecretRetrievalMethod::WgFederationEnvVar,
				),
				(
					"wg-federation-command",
					SecretRetrievalMethod::WgFederationCommand,
				),
			],
		)
	}
}

/// Fully resolved user input. Built once per process and shared by reference.
#[derive(Debug, Clone)]
pub struct UserInput {
	pub state_dir: PathBuf,
	pub source_dirs: Vec<PathBuf>,
	/// Raw explicit source descriptors; parsed by the transform layer.
	pub sources: Vec<String>,
	pub state_format: StateFormat,
	pub io_timeout: Duration,
	pub log_level: LogLevel,
	pub log_format: LogFormat,
	pub private_key_retrieval_method: SecretRetrievalMethod,
	pub root_passphrase_command: Option<String>,
	pub apply_command: Option<String>,
	pub audit_interval: Option<Duration>,
	/// Keys the state digests when present (HMAC), plain SHA-256 otherwise.
	pub state_signing_key: Option<SecretString>,
}

impl UserInput {
	/// Input with defaults for everything except the state directory.
	pub fn with_state_dir(state_dir: impl Into<PathBuf>) -> Self {
		Self {
			state_dir: state_dir.into(),
			source_dirs: Vec::new(),
			sources: Vec::new(),
			state_format: StateFormat::default(),
			io_timeout: Duration::from_secs(10),
			log_level: LogLevel::default(),
			log_format: LogFormat::default(),
			private_key_retrieval_method: SecretRetrievalMethod::default(),
			root_passphrase_command: None,
			apply_command: None,
			audit_interval: None,
			state_signing_key: None,
		}
	}

	/// Cross-option rules. Single-option checks already ran during resolution.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.state_dir.as_os_str().is_empty() {
			return Err(ConfigError::validation("state_dir must not be empty"));
		}

		if self.source_dirs.is_empty() && self.sources.is_empty() {
			return Err(ConfigError::validation(
				"no configuration sources declared: set source_dirs or sources",
			));
		}

		if self.source_dirs.iter().any(|d| d == &self.state_dir) {
			return Err(ConfigError::validation(
				"state_dir must not also be a source directory",
			));
		}

		if self.io_timeout.is_zero() {
			return Err(ConfigError::invalid_value(
				option::IO_TIMEOUT_SECS.name,
				"must be greater than zero",
			));
		}

		if self.private_key_retrieval_method == SecretRetrievalMethod::WgFederationCommand
			&& self.root_passphrase_command.is_none()
		{
			return Err(ConfigError::validation(format!(
				"{} requires {}",
				SecretRetrievalMethod::WgFederationCommand,
				option::ROOT_PASSPHRASE_COMMAND.name
			)));
		}

		if let Some(command) = &self.apply_command {
			if !command.contains("{interface}") {
				return Err(ConfigError::invalid_value(
					option::APPLY_COMMAND.name,
					"must reference {interface}",
				));
			}
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn valid_input() -> UserInput {
		let mut input = UserInput::with_state_dir("/var/lib/wg-federation");
		input.source_dirs = vec![PathBuf::from("/etc/wg-federation/sources")];
		input
	}

	#[test]
	fn enums_parse_case_insensitively() {
		assert_eq!("TOML".parse::<StateFormat>().unwrap(), StateFormat::Toml);
		assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
		assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warn);
		assert_eq!(
			"wg-federation-command"
				.parse::<SecretRetrievalMethod>()
				.unwrap(),
			SecretRetrievalMethod::WgFederationCommand
		);
	}

	#[test]
	fn enum_parse_error_names_the_option() {
		let err = "ini".parse::<StateFormat>().unwrap_err();
		assert!(err.to_string().contains("state_format"));
		assert_eq!("yaml".parse::<StateFormat>().unwrap(), StateFormat::Yaml);
	}

	#[test]
	fn valid_input_passes() {
		assert!(valid_input().validate().is_ok());
	}

	#[test]
	fn missing_sources_is_rejected() {
		let input = UserInput::with_state_dir("/var/lib/wg-federation");
		let err = input.validate().unwrap_err();
		assert!(err.to_string().contains("no configuration sources"));
	}

	#[test]
	fn state_dir_cannot_be_a_source_dir() {
		let mut input = valid_input();
		input.source_dirs.push(input.state_dir.clone());
		assert!(input.validate().is_err());
	}

	#[test]
	fn command_method_requires_passphrase_command() {
		let mut input = valid_input();
		input.private_key_retrieval_method = SecretRetrievalMethod::WgFederationCommand;
		assert!(input.validate().is_err());

		input.root_passphrase_command = Some("pass show wgf/root".to_string());
		assert!(input.validate().is_ok());
	}

	#[test]
	fn apply_command_must_reference_interface() {
		let mut input = valid_input();
		input.apply_command = Some("wg-quick up".to_string());
		assert!(input.validate().is_err());

		input.apply_command = Some("wg-quick {action} {interface}".to_string());
		assert!(input.validate().is_ok());
	}
}
