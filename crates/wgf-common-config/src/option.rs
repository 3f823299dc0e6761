// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Declarative table of every externally exposed tunable.
//!
//! The table is the single place that names an option: the CLI crate builds
//! its help from it, [`crate::sources::EnvSource`] derives `WGF_*` variable
//! names from it, and the TOML file uses [`CommandLineOption::name`] as keys.

use crate::env::ENV_PREFIX;
use crate::ConfigError;

/// How a raw option value is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
	Path,
	/// Comma separated list of paths.
	PathList,
	/// Comma separated list of free-form strings.
	StringList,
	String,
	/// One of a closed set of values.
	Choice(&'static [&'static str]),
	/// Whole, strictly positive number of seconds.
	Seconds,
}

/// Description of one option at the input boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandLineOption {
	pub name: &'static str,
	pub cli_alias: &'static str,
	pub short_flag: Option<char>,
	pub default: Option<&'static str>,
	pub description: &'static str,
	pub kind: OptionKind,
}

impl CommandLineOption {
	/// Environment variable carrying this option, e.g. `WGF_STATE_DIR`.
	pub fn env_var(&self) -> String {
		format!("{ENV_PREFIX}{}", self.name.to_ascii_uppercase())
	}

	/// Check a raw value against [`OptionKind`] without converting it.
	pub fn check(&self, raw: &str) -> Result<(), ConfigError> {
		match self.kind {
			OptionKind::Choice(values) if !values.contains(&raw) => Err(ConfigError::invalid_value(
				self.name,
				format!("'{raw}' is not one of {}", values.join(", ")),
			)),
			OptionKind::Seconds => match raw.parse::<u64>() {
				Ok(0) => Err(ConfigError::invalid_value(self.name, "must be greater than zero")),
				Ok(_) => Ok(()),
				Err(_) => Err(ConfigError::invalid_value(
					self.name,
					format!("'{raw}' is not a whole number of seconds"),
				)),
			},
			OptionKind::Path | OptionKind::String if raw.trim().is_empty() => {
				Err(ConfigError::invalid_value(self.name, "must not be empty"))
			}
			_ => Ok(()),
		}
	}
}

pub const STATE_DIR: CommandLineOption = CommandLineOption {
	name: "state_dir",
	cli_alias: "--state-dir",
	short_flag: Some('d'),
	default: None,
	description: "Directory holding persisted interface state and digests",
	kind: OptionKind::Path,
};

pub const SOURCE_DIRS: CommandLineOption = CommandLineOption {
	name: "source_dirs",
	cli_alias: "--source-dir",
	short_flag: Some('s'),
	default: None,
	description: "Directories scanned for interface source files",
	kind: OptionKind::PathList,
};

pub const SOURCES: CommandLineOption = CommandLineOption {
	name: "sources",
	cli_alias: "--source",
	short_flag: None,
	default: None,
	description: "Explicit sources: a file path, env:PREFIX or an http(s) URL",
	kind: OptionKind::StringList,
};

pub const STATE_FORMAT: CommandLineOption = CommandLineOption {
	name: "state_format",
	cli_alias: "--state-format",
	short_flag: None,
	default: Some("json"),
	description: "Format of persisted interface state",
	kind: OptionKind::Choice(&["json", "toml", "yaml"]),
};

pub const IO_TIMEOUT_SECS: CommandLineOption = CommandLineOption {
	name: "io_timeout_secs",
	cli_alias: "--io-timeout",
	short_flag: None,
	default: Some("10"),
	description: "Timeout applied to every load and save call",
	kind: OptionKind::Seconds,
};

pub const LOG_LEVEL: CommandLineOption = CommandLineOption {
	name: "log_level",
	cli_alias: "--log-level",
	short_flag: Some('l'),
	default: Some("info"),
	description: "Default log filter, overridden by RUST_LOG",
	kind: OptionKind::Choice(&["trace", "debug", "info", "warn", "error"]),
};

pub const LOG_FORMAT: CommandLineOption = CommandLineOption {
	name: "log_format",
	cli_alias: "--log-format",
	short_flag: None,
	default: Some("pretty"),
	description: "Log output format",
	kind: OptionKind::Choice(&["pretty", "json"]),
};

pub const PRIVATE_KEY_RETRIEVAL_METHOD: CommandLineOption = CommandLineOption {
	name: "private_key_retrieval_method",
	cli_alias: "--private-key-retrieval-method",
	short_flag: None,
	default: Some("wg-federation-env-var"),
	description: "How interface private keys are retrieved at apply time",
	kind: OptionKind::Choice(&[
		"test-insecure-cleartext",
		"wg-federation-env-var",
		"wg-federation-command",
	]),
};

pub const ROOT_PASSPHRASE_COMMAND: CommandLineOption = CommandLineOption {
	name: "root_passphrase_command",
	cli_alias: "--root-passphrase-command",
	short_flag: None,
	default: None,
	description: "Command printing the root passphrase (wg-federation-command method)",
	kind: OptionKind::String,
};

pub const APPLY_COMMAND: CommandLineOption = CommandLineOption {
	name: "apply_command",
	cli_alias: "--apply-command",
	short_flag: None,
	default: None,
	description: "External WireGuard apply command; {interface}, {path} and {action} are substituted",
	kind: OptionKind::String,
};

pub const AUDIT_INTERVAL_SECS: CommandLineOption = CommandLineOption {
	name: "audit_interval_secs",
	cli_alias: "--audit-interval",
	short_flag: None,
	default: None,
	description: "Re-verify persisted digests every N seconds after the run",
	kind: OptionKind::Seconds,
};

/// Every option, in help order.
pub const OPTIONS: &[CommandLineOption] = &[
	STATE_DIR,
	SOURCE_DIRS,
	SOURCES,
	STATE_FORMAT,
	IO_TIMEOUT_SECS,
	LOG_LEVEL,
	LOG_FORMAT,
	PRIVATE_KEY_RETRIEVAL_METHOD,
	ROOT_PASSPHRASE_COMMAND,
	APPLY_COMMAND,
	AUDIT_INTERVAL_SECS,
];

/// Look an option up by its table name.
pub fn find_option(name: &str) -> Option<&'static CommandLineOption> {
	OPTIONS.iter().find(|o| o.name == name)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;

	#[test]
	fn env_var_names_are_prefixed_upper_case() {
		assert_eq!(STATE_DIR.env_var(), "WGF_STATE_DIR");
		assert_eq!(IO_TIMEOUT_SECS.env_var(), "WGF_IO_TIMEOUT_SECS");
	}

	#[test]
	fn names_aliases_and_short_flags_are_unique() {
		let names: HashSet<_> = OPTIONS.iter().map(|o| o.name).collect();
		let aliases: HashSet<_> = OPTIONS.iter().map(|o| o.cli_alias).collect();
		let shorts: Vec<_> = OPTIONS.iter().filter_map(|o| o.short_flag).collect();
		let unique_shorts: HashSet<_> = shorts.iter().collect();

		assert_eq!(names.len(), OPTIONS.len());
		assert_eq!(aliases.len(), OPTIONS.len());
		assert_eq!(unique_shorts.len(), shorts.len());
	}

	#[test]
	fn defaults_pass_their_own_check() {
		for option in OPTIONS {
			if let Some(default) = option.default {
				assert!(option.check(default).is_ok(), "{} default rejected", option.name);
			}
		}
	}

	#[test]
	fn choice_rejects_unknown_value() {
		let err = STATE_FORMAT.check("ini").unwrap_err();
		assert!(err.to_string().contains("json, toml, yaml"));
	}

	#[test]
	fn seconds_rejects_zero_and_garbage() {
		assert!(IO_TIMEOUT_SECS.check("0").is_err());
		assert!(IO_TIMEOUT_SECS.check("ten").is_err());
		assert!(IO_TIMEOUT_SECS.check("30").is_ok());
	}

	#[test]
	fn find_option_by_name() {
		assert_eq!(find_option("apply_command"), Some(&APPLY_COMMAND));
		assert!(find_option("nope").is_none());
	}
}
