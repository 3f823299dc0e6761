// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use serde_json::Value;
use wgf_common_config::EnvSnapshot;

use super::ConfigurationLoader;
use crate::error::LoadError;
use crate::map::ConfigMap;
use crate::source::ConfigurationSource;

/// `WGF_IFACE_META__REGION` becomes `{"meta": {"region": ...}}`.
const NESTING_SEPARATOR: &str = "__";

/// Environment variable blocks sharing a prefix.
///
/// Keys are the lower-cased remainder after the prefix. Values that parse as
/// JSON (numbers, booleans, arrays, objects) keep their type, anything else is
/// a string. Keys come out sorted.
pub struct EnvLoader {
	env: EnvSnapshot,
}

impl EnvLoader {
	pub fn new(env: EnvSnapshot) -> Self {
		Self { env }
	}
}

#[async_trait]
impl ConfigurationLoader for EnvLoader {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn supports(&self, source: &ConfigurationSource) -> bool {
		match source {
			ConfigurationSource::Environment { prefix } if !prefix.is_empty() => {
				self.env.with_prefix(prefix).next().is_some()
			}
			_ => false,
		}
	}

	async fn load_from(&self, source: &ConfigurationSource) -> Result<ConfigMap, LoadError> {
		let identity = source.identity();
		let ConfigurationSource::Environment { prefix } = source else {
			return Err(LoadError::parse(identity, "not an environment source"));
		};

		let mut map = ConfigMap::new();
		for (name, raw) in self.env.with_prefix(prefix) {
			let key = name[prefix.len()..].to_ascii_lowercase();
			if key.is_empty() {
				continue;
			}
			let path: Vec<&str> = key.split(NESTING_SEPARATOR).collect();
			insert_nested(&mut map, &path, parse_scalar(raw), &identity)?;
		}
		Ok(map)
	}
}

fn parse_scalar(raw: &str) -> Value {
	serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn insert_nested(map: &mut ConfigMap, path: &[&str], value: Value, identity: &str) -> Result<(), LoadError> {
	let Some((last, parents)) = path.split_last() else {
		return Ok(());
	};

	let mut current = map;
	for segment in parents {
		let entry = current
			.entry(segment.to_string())
			.or_insert_with(|| Value::Object(ConfigMap::new()));
		current = match entry {
			Value::Object(inner) => inner,
			_ => {
				return Err(LoadError::parse(
					identity,
					format!("'{}' is both a value and a table", path.join(NESTING_SEPARATOR)),
				))
			}
		};
	}

	current.insert(last.to_string(), value);
	Ok(())
}
