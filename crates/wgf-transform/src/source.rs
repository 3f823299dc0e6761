// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

/// Where a configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConfigurationSource {
	File(PathBuf),
	/// Environment variables starting with `prefix`.
	Environment { prefix: String },
	Remote(Url),
}

impl ConfigurationSource {
	pub const ENV_SCHEME: &'static str = "env:";

	/// Interpret a raw source descriptor: `env:PREFIX`, an `http(s)://` URL,
	/// or else a filesystem path.
	pub fn parse(raw: &str) -> Self {
		let raw = raw.trim();
		if let Some(prefix) = raw.strip_prefix(Self::ENV_SCHEME) {
			return Self::Environment {
				prefix: prefix.to_string(),
			};
		}

		if raw.starts_with("http://") || raw.starts_with("https://") {
			if let Ok(url) = Url::parse(raw) {
				return Self::Remote(url);
			}
		}

		Self::File(PathBuf::from(raw))
	}

	pub fn path(&self) -> Option<&Path> {
		match self {
			ConfigurationSource::File(path) => Some(path),
			_ => None,
		}
	}

	/// Stable string used in logs, reports and persisted state.
	pub fn identity(&self) -> String {
		self.to_string()
	}
}

impl fmt::Display for ConfigurationSource {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigurationSource::File(path) => write!(f, "{}", path.display()),
			ConfigurationSource::Environment { prefix } => write!(f, "{}{prefix}", Self::ENV_SCHEME),
			ConfigurationSource::Remote(url) => write!(f, "{url}"),
		}
	}
}

impl From<PathBuf> for ConfigurationSource {
	fn from(path: PathBuf) -> Self {
		Self::File(path)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_each_form() {
		assert_eq!(
			ConfigurationSource::parse("env:WGF_IFACE_"),
			ConfigurationSource::Environment {
				prefix: "WGF_IFACE_".to_string()
			}
		);
		assert!(matches!(
			ConfigurationSource::parse("https://hq.example.org/wg0.json"),
			ConfigurationSource::Remote(_)
		));
		assert_eq!(
			ConfigurationSource::parse("/etc/wgf/wg0.toml"),
			ConfigurationSource::File(PathBuf::from("/etc/wgf/wg0.toml"))
		);
	}

	#[test]
	fn identity_round_trips_through_parse() {
		for raw in ["env:WGF_IFACE_", "https://hq.example.org/wg0.json", "/etc/wgf/wg0.toml"] {
			let source = ConfigurationSource::parse(raw);
			assert_eq!(ConfigurationSource::parse(&source.identity()), source);
		}
	}
}
