// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde_json::Value;

use super::ConfigurationLoader;
use crate::error::LoadError;
use crate::map::{parse_json, parse_toml, parse_yaml, ConfigMap};
use crate::saver::{classify_destination, DestinationKind};
use crate::source::ConfigurationSource;

fn existing_file_of_kind(source: &ConfigurationSource, kind: DestinationKind) -> bool {
	source
		.path()
		.is_some_and(|p| classify_destination(p) == kind && p.is_file())
}

async fn read_source(source: &ConfigurationSource) -> Result<String, LoadError> {
	let identity = source.identity();
	let path = source.path().ok_or_else(|| LoadError::parse(&identity, "not a file source"))?;
	tokio::fs::read_to_string(path)
		.await
		.map_err(|e| LoadError::Io { identity, source: e })
}

/// `*.json` files.
pub struct JsonFileLoader;

#[async_trait]
impl ConfigurationLoader for JsonFileLoader {
	fn name(&self) -> &'static str {
		"json-file"
	}

	fn supports(&self, source: &ConfigurationSource) -> bool {
		existing_file_of_kind(source, DestinationKind::Json)
	}

	async fn load_from(&self, source: &ConfigurationSource) -> Result<ConfigMap, LoadError> {
		let text = read_source(source).await?;
		parse_json(&text, &source.identity())
	}
}

/// `*.toml` files.
pub struct TomlFileLoader;

#[async_trait]
impl ConfigurationLoader for TomlFileLoader {
	fn name(&self) -> &'static str {
		"toml-file"
	}

	fn supports(&self, source: &ConfigurationSource) -> bool {
		existing_file_of_kind(source, DestinationKind::Toml)
	}

	async fn load_from(&self, source: &ConfigurationSource) -> Result<ConfigMap, LoadError> {
		let text = read_source(source).await?;
		parse_toml(&text, &source.identity())
	}
}

/// `*.yaml` and `*.yml` files.
pub struct YamlFileLoader;

#[async_trait]
impl ConfigurationLoader for YamlFileLoader {
	fn name(&self) -> &'static str {
		"yaml-file"
	}

	fn supports(&self, source: &ConfigurationSource) -> bool {
		existing_file_of_kind(source, DestinationKind::Yaml)
	}

	async fn load_from(&self, source: &ConfigurationSource) -> Result<ConfigMap, LoadError> {
		let text = read_source(source).await?;
		parse_yaml(&text, &source.identity())
	}
}

/// Digest-style text files: one value per line, keyed by line index.
pub struct TextFileLoader;

#[async_trait]
impl ConfigurationLoader for TextFileLoader {
	fn name(&self) -> &'static str {
		"text-file"
	}

	fn supports(&self, source: &ConfigurationSource) -> bool {
		existing_file_of_kind(source, DestinationKind::Digest)
	}

	async fn load_from(&self, source: &ConfigurationSource) -> Result<ConfigMap, LoadError> {
		let text = read_source(source).await?;
		Ok(text
			.lines()
			.enumerate()
			.map(|(i, line)| (i.to_string(), Value::String(line.to_string())))
			.collect())
	}
}
