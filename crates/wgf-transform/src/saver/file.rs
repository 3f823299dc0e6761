// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use super::{classify_destination, ConfigurationSaver, DestinationKind};
use crate::atomic::atomic_write_async;
use crate::error::SaveError;
use crate::map::{render_json, render_toml, render_yaml, ConfigMap};

#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

async fn write(destination: &Path, bytes: Vec<u8>) -> Result<(), SaveError> {
	atomic_write_async(destination.to_path_buf(), bytes)
		.await
		.map_err(|e| SaveError::Write {
			identity: destination.display().to_string(),
			source: e,
		})
}

/// Pretty JSON, round-trippable with `JsonFileLoader`.
pub struct JsonFileSaver;

#[async_trait]
impl ConfigurationSaver for JsonFileSaver {
	fn name(&self) -> &'static str {
		"json-file"
	}

	fn supports(&self, _data: &ConfigMap, destination: &Path) -> bool {
		classify_destination(destination) == DestinationKind::Json
	}

	async fn save(&self, data: &ConfigMap, destination: &Path) -> Result<(), SaveError> {
		let bytes = render_json(data, &destination.display().to_string())?;
		write(destination, bytes).await
	}
}

/// TOML, round-trippable with `TomlFileLoader`.
pub struct TomlFileSaver;

#[async_trait]
impl ConfigurationSaver for TomlFileSaver {
	fn name(&self) -> &'static str {
		"toml-file"
	}

	fn supports(&self, _data: &ConfigMap, destination: &Path) -> bool {
		classify_destination(destination) == DestinationKind::Toml
	}

	async fn save(&self, data: &ConfigMap, destination: &Path) -> Result<(), SaveError> {
		let bytes = render_toml(data, &destination.display().to_string())?;
		write(destination, bytes).await
	}
}

/// YAML, round-trippable with `YamlFileLoader`.
pub struct YamlFileSaver;

#[async_trait]
impl ConfigurationSaver for YamlFileSaver {
	fn name(&self) -> &'static str {
		"yaml-file"
	}

	fn supports(&self, _data: &ConfigMap, destination: &Path) -> bool {
		classify_destination(destination) == DestinationKind::Yaml
	}

	async fn save(&self, data: &ConfigMap, destination: &Path) -> Result<(), SaveError> {
		let bytes = render_yaml(data, &destination.display().to_string())?;
		write(destination, bytes).await
	}
}

/// One value per line, in mapping order, each line terminated with the OS line
/// separator. Only flat mappings of single-line scalars are accepted.
pub struct TextFileSaver;

impl TextFileSaver {
	pub fn render(data: &ConfigMap) -> String {
		let mut out = String::new();
		for value in data.values() {
			match value {
				Value::String(s) => out.push_str(s),
				Value::Null => {}
				other => out.push_str(&other.to_string()),
			}
			out.push_str(LINE_SEPARATOR);
		}
		out
	}
}

fn is_single_line_scalar(value: &Value) -> bool {
	match value {
		Value::String(s) => !s.contains(['\n', '\r']),
		Value::Array(_) | Value::Object(_) => false,
		_ => true,
	}
}

#[async_trait]
impl ConfigurationSaver for TextFileSaver {
	fn name(&self) -> &'static str {
		"text-file"
	}

	fn supports(&self, data: &ConfigMap, destination: &Path) -> bool {
		classify_destination(destination) == DestinationKind::Digest
			&& data.values().all(is_single_line_scalar)
	}

	async fn save(&self, data: &ConfigMap, destination: &Path) -> Result<(), SaveError> {
		write(destination, Self::render(data).into_bytes()).await
	}
}
