// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The normalized mapping every loader produces and every saver consumes.
//!
//! `serde_json` is built with `preserve_order`, so a [`ConfigMap`] keeps
//! insertion order from loader through reconciliation to saver. Digests
//! depend on that.

use serde_json::Value;

use crate::error::{LoadError, SaveError};

pub type ConfigMap = serde_json::Map<String, Value>;

pub(crate) fn into_map(value: Value, identity: &str) -> Result<ConfigMap, LoadError> {
	match value {
		Value::Object(map) => Ok(map),
		_ => Err(LoadError::NotAMapping {
			identity: identity.to_string(),
		}),
	}
}

pub(crate) fn parse_json(text: &str, identity: &str) -> Result<ConfigMap, LoadError> {
	let value: Value = serde_json::from_str(text).map_err(|e| LoadError::parse(identity, e))?;
	into_map(value, identity)
}

pub(crate) fn parse_toml(text: &str, identity: &str) -> Result<ConfigMap, LoadError> {
	let table: toml::Table = toml::from_str(text).map_err(|e| LoadError::parse(identity, e))?;
	let value = serde_json::to_value(table).map_err(|e| LoadError::parse(identity, e))?;
	into_map(value, identity)
}

pub(crate) fn parse_yaml(text: &str, identity: &str) -> Result<ConfigMap, LoadError> {
	let value: Value = serde_yaml::from_str(text).map_err(|e| LoadError::parse(identity, e))?;
	into_map(value, identity)
}

pub(crate) fn render_json(data: &ConfigMap, identity: &str) -> Result<Vec<u8>, SaveError> {
	let mut bytes = serde_json::to_vec_pretty(data).map_err(|e| SaveError::serialize(identity, e))?;
	bytes.push(b'\n');
	Ok(bytes)
}

/// TOML has no null; callers omit absent optional values instead.
pub(crate) fn render_toml(data: &ConfigMap, identity: &str) -> Result<Vec<u8>, SaveError> {
	toml::to_string_pretty(data)
		.map(String::into_bytes)
		.map_err(|e| SaveError::serialize(identity, e))
}

pub(crate) fn render_yaml(data: &ConfigMap, identity: &str) -> Result<Vec<u8>, SaveError> {
	serde_yaml::to_string(data)
		.map(String::into_bytes)
		.map_err(|e| SaveError::serialize(identity, e))
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn json_keeps_key_order() {
		let map = parse_json(r#"{"zeta": 1, "alpha": 2, "mid": 3}"#, "t").unwrap();
		let keys: Vec<&str> = map.keys().map(String::as_str).collect();
		assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
	}

	#[test]
	fn toml_keeps_key_order() {
		let map = parse_toml("zeta = 1\nalpha = \"a\"\n", "t").unwrap();
		let keys: Vec<&str> = map.keys().map(String::as_str).collect();
		assert_eq!(keys, vec!["zeta", "alpha"]);
	}

	#[test]
	fn top_level_array_is_rejected() {
		assert!(matches!(
			parse_json("[1, 2]", "t"),
			Err(LoadError::NotAMapping { .. })
		));
	}

	#[test]
	fn toml_render_reparses_to_the_same_mapping() {
		let value = json!({
			"interface": "wg0",
			"listen_port": 51820,
			"peers": [
				{ "public_key": "abc", "allowed_ips": ["10.0.0.2/32"] }
			]
		});
		let map = into_map(value, "t").unwrap();

		let bytes = render_toml(&map, "t").unwrap();
		let text = String::from_utf8(bytes).unwrap();
		assert_eq!(parse_toml(&text, "t").unwrap(), map);
	}

	#[test]
	fn toml_render_rejects_null() {
		let map = into_map(json!({ "mtu": null }), "t").unwrap();
		assert!(render_toml(&map, "t").is_err());
	}

	#[test]
	fn yaml_keeps_key_order_and_nesting() {
		let text = "interface: wg0\nlisten_port: 51820\npeers:\n  - public_key: abc\n    allowed_ips: [10.0.0.2/32]\n";
		let map = parse_yaml(text, "t").unwrap();
		let keys: Vec<&str> = map.keys().map(String::as_str).collect();
		assert_eq!(keys, vec!["interface", "listen_port", "peers"]);
		assert_eq!(map["peers"][0]["allowed_ips"], json!(["10.0.0.2/32"]));

		let rendered = String::from_utf8(render_yaml(&map, "t").unwrap()).unwrap();
		assert_eq!(parse_yaml(&rendered, "t").unwrap(), map);
	}

	#[test]
	fn yaml_scalar_document_is_not_a_mapping() {
		assert!(matches!(
			parse_yaml("just a string", "t"),
			Err(LoadError::NotAMapping { .. })
		));
	}
}
