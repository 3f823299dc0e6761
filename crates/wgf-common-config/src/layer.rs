// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Partial option layers, one per source, merged in precedence order.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::input::{LogFormat, LogLevel, SecretRetrievalMethod, StateFormat, UserInput};
use crate::option;
use crate::ConfigError;

/// Every field is optional; `None` means "this source has no opinion".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputLayer {
	pub state_dir: Option<PathBuf>,
	pub source_dirs: Option<Vec<PathBuf>>,
	pub sources: Option<Vec<String>>,
	pub state_format: Option<StateFormat>,
	pub io_timeout_secs: Option<u64>,
	pub log_level: Option<LogLevel>,
	pub log_format: Option<LogFormat>,
	pub private_key_retrieval_method: Option<SecretRetrievalMethod>,
	pub root_passphrase_command: Option<String>,
	pub apply_command: Option<String>,
	pub audit_interval_secs: Option<u64>,
}

impl InputLayer {
	/// Overlay `other` on top of `self`. Lists replace, they do not append.
	pub fn merge(&mut self, other: InputLayer) {
		merge_value(&mut self.state_dir, other.state_dir);
		merge_value(&mut self.source_dirs, other.source_dirs);
		merge_value(&mut self.sources, other.sources);
		merge_value(&mut self.state_format, other.state_format);
		merge_value(&mut self.io_timeout_secs, other.io_timeout_secs);
		merge_value(&mut self.log_level, other.log_level);
		merge_value(&mut self.log_format, other.log_format);
		merge_value(
			&mut self.private_key_retrieval_method,
			other.private_key_retrieval_method,
		);
		merge_value(
			&mut self.root_passphrase_command,
			other.root_passphrase_command,
		);
		merge_value(&mut self.apply_command, other.apply_command);
		merge_value(&mut self.audit_interval_secs, other.audit_interval_secs);
	}

	/// Set a field from its raw string form, as read from env or defaults.
	pub fn set_raw(&mut self, name: &str, raw: &str) -> Result<(), ConfigError> {
		let opt = option::find_option(name)
			.ok_or_else(|| ConfigError::invalid_value(name, "unknown option"))?;
		opt.check(raw)?;

		match name {
			"state_dir" => self.state_dir = Some(PathBuf::from(raw)),
			"source_dirs" => self.source_dirs = Some(split_list(raw).map(PathBuf::from).collect()),
			"sources" => self.sources = Some(split_list(raw).map(str::to_string).collect()),
			"state_format" => self.state_format = Some(raw.parse()?),
			"io_timeout_secs" => self.io_timeout_secs = Some(parse_seconds(name, raw)?),
			"log_level" => self.log_level = Some(raw.parse()?),
			"log_format" => self.log_format = Some(raw.parse()?),
			"private_key_retrieval_method" => {
				self.private_key_retrieval_method = Some(raw.parse()?)
			}
			"root_passphrase_command" => self.root_passphrase_command = Some(raw.to_string()),
			"apply_command" => self.apply_command = Some(raw.to_string()),
			"audit_interval_secs" => self.audit_interval_secs = Some(parse_seconds(name, raw)?),
			_ => return Err(ConfigError::invalid_value(name, "unknown option")),
		}
		Ok(())
	}

	/// Turn the merged layer into [`UserInput`]. Fields still unset fall back
	/// to the built-in defaults; `state_dir` must have been provided by then.
	pub fn finalize(self) -> Result<UserInput, ConfigError> {
		let state_dir = self.state_dir.ok_or_else(|| {
			ConfigError::invalid_value(option::STATE_DIR.name, "no value provided")
		})?;

		let mut input = UserInput::with_state_dir(state_dir);
		input.source_dirs = self.source_dirs.unwrap_or_default();
		input.sources = self.sources.unwrap_or_default();
		input.state_format = self.state_format.unwrap_or_default();
		if let Some(secs) = self.io_timeout_secs {
			input.io_timeout = Duration::from_secs(secs);
		}
		input.log_level = self.log_level.unwrap_or_default();
		input.log_format = self.log_format.unwrap_or_default();
		input.private_key_retrieval_method = self.private_key_retrieval_method.unwrap_or_default();
		input.root_passphrase_command = self.root_passphrase_command;
		input.apply_command = self.apply_command;
		input.audit_interval = self.audit_interval_secs.map(Duration::from_secs);
		Ok(input)
	}
}

fn merge_value<T>(target: &mut Option<T>, source: Option<T>) {
	if source.is_some() {
		*target = source;
	}
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
	raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_seconds(name: &str, raw: &str) -> Result<u64, ConfigError> {
	raw
		.parse::<u64>()
		.map_err(|_| ConfigError::invalid_value(name, format!("'{raw}' is not a whole number of seconds")))
}
