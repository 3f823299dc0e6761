// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::ConfigurationLoader;
use crate::error::LoadError;
use crate::map::{parse_json, parse_toml, ConfigMap};
use crate::source::ConfigurationSource;

/// Configuration published over HTTP(S) by a federation headquarters.
///
/// TOML is used when the response says so or the URL path ends in `.toml`;
/// everything else is parsed as JSON.
pub struct RemoteLoader {
	client: reqwest::Client,
}

impl RemoteLoader {
	pub fn new(timeout: Duration) -> Self {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.user_agent(concat!("wg-federation/", env!("CARGO_PKG_VERSION")))
			.build()
			.unwrap_or_else(|_| reqwest::Client::new());
		Self { client }
	}
}

#[async_trait]
impl ConfigurationLoader for RemoteLoader {
	fn name(&self) -> &'static str {
		"remote"
	}

	fn supports(&self, source: &ConfigurationSource) -> bool {
		matches!(source, ConfigurationSource::Remote(url) if matches!(url.scheme(), "http" | "https"))
	}

	async fn load_from(&self, source: &ConfigurationSource) -> Result<ConfigMap, LoadError> {
		let identity = source.identity();
		let ConfigurationSource::Remote(url) = source else {
			return Err(LoadError::parse(identity, "not a remote source"));
		};

		let http_err = |e| LoadError::Http {
			identity: identity.clone(),
			source: e,
		};

		let response = self
			.client
			.get(url.clone())
			.send()
			.await
			.and_then(|r| r.error_for_status())
			.map_err(http_err)?;

		let is_toml = response
			.headers()
			.get(CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
			.is_some_and(|ct| ct.contains("toml"))
			|| url.path().ends_with(".toml");

		let body = response.text().await.map_err(http_err)?;
		debug!(source = %identity, bytes = body.len(), is_toml, "fetched remote configuration");

		if is_toml {
			parse_toml(&body, &identity)
		} else {
			parse_json(&body, &identity)
		}
	}
}
