// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The desired state of one WireGuard interface.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;
use wgf_common_config::SecretRetrievalMethod;
use wgf_transform::ConfigMap;

use crate::keys::{KeyError, WgPublicKey};
use crate::peer::PeerRecord;
use crate::secret_ref::PrivateKeyRef;

/// Linux limits interface names to IFNAMSIZ - 1 bytes.
static INTERFACE_NAME: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_=+.-]{1,15}$").ok());

pub const MIN_MTU: u32 = 576;
pub const MAX_MTU: u32 = 65535;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
	#[error("configuration does not describe an interface: {0}")]
	Parse(String),

	#[error("interface name is empty")]
	EmptyName,

	#[error("interface name '{0}' is not a valid interface name")]
	InvalidName(String),

	#[error("interface {interface} lists peer {peer} more than once")]
	DuplicatePeer { interface: String, peer: WgPublicKey },

	#[error("interface {0} lists its own public key as a peer")]
	SelfPeer(String),

	#[error("interface {interface} has MTU {mtu}, expected 576..=65535")]
	InvalidMtu { interface: String, mtu: u32 },

	#[error("interface {interface} carries a cleartext private key but retrieval method is {method}")]
	CleartextNotAllowed { interface: String, method: &'static str },

	#[error("interface {interface} has an unreadable cleartext private key: {source}")]
	PrivateKey {
		interface: String,
		#[source]
		source: KeyError,
	},

	#[error("interface {0}: private key does not match public key")]
	PrivateKeyMismatch(String),

	#[error("failed to serialize interface {interface}: {message}")]
	Serialize { interface: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireguardConfiguration {
	#[serde(rename = "interface", default)]
	pub name: String,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub private_key: Option<PrivateKeyRef>,

	pub public_key: WgPublicKey,

	pub listen_port: u16,

	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mtu: Option<u32>,

	#[serde(default)]
	pub peers: Vec<PeerRecord>,

	#[serde(default)]
	pub revision: u64,

	/// Identity of the source this state was reconciled from.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub source: Option<String>,
}

impl WireguardConfiguration {
	pub fn new(name: impl Into<String>, public_key: WgPublicKey, listen_port: u16) -> Self {
		Self {
			name: name.into(),
			private_key: None,
			public_key,
			listen_port,
			mtu: None,
			peers: Vec::new(),
			revision: 0,
			source: None,
		}
	}

	/// Build from a loaded mapping. `fallback_name` names the interface when
	/// the mapping has no `interface` key, typically the source file stem.
	pub fn from_map(map: ConfigMap, fallback_name: Option<&str>) -> Result<Self, ValidationError> {
		let mut config: Self =
			serde_json::from_value(Value::Object(map)).map_err(|e| ValidationError::Parse(e.to_string()))?;

		if config.name.is_empty() {
			if let Some(fallback) = fallback_name {
				config.name = fallback.to_string();
			}
		}

		config.validate()?;
		Ok(config)
	}

	pub fn to_map(&self) -> Result<ConfigMap, ValidationError> {
		let serialize_error = |message: String| ValidationError::Serialize {
			interface: self.name.clone(),
			message,
		};

		match serde_json::to_value(self).map_err(|e| serialize_error(e.to_string()))? {
			Value::Object(map) => Ok(map),
			other => Err(serialize_error(format!("expected an object, got {other}"))),
		}
	}

	pub fn validate(&self) -> Result<(), ValidationError> {
		if self.name.is_empty() {
			return Err(ValidationError::EmptyName);
		}
		if !INTERFACE_NAME.as_ref().is_some_and(|re| re.is_match(&self.name)) {
			return Err(ValidationError::InvalidName(self.name.clone()));
		}

		if let Some(mtu) = self.mtu {
			if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
				return Err(ValidationError::InvalidMtu {
					interface: self.name.clone(),
					mtu,
				});
			}
		}

		let mut seen = HashSet::with_capacity(self.peers.len());
		for peer in &self.peers {
			if peer.public_key == self.public_key {
				return Err(ValidationError::SelfPeer(self.name.clone()));
			}
			if !seen.insert(peer.public_key) {
				return Err(ValidationError::DuplicatePeer {
					interface: self.name.clone(),
					peer: peer.public_key,
				});
			}
		}

		Ok(())
	}

	/// Equal on every attribute except the revision counter.
	pub fn same_state_as(&self, other: &Self) -> bool {
		self.name == other.name
			&& self.private_key == other.private_key
			&& self.public_key == other.public_key
			&& self.listen_port == other.listen_port
			&& self.mtu == other.mtu
			&& self.peers == other.peers
			&& self.source == other.source
	}

	pub fn with_revision(mut self, revision: u64) -> Self {
		self.revision = revision;
		self
	}

	/// Check the private key reference against the retrieval method. Cleartext
	/// keys are decoded here so a wrong key is caught before anything is saved.
	pub fn validate_private_key(&self, method: SecretRetrievalMethod) -> Result<(), ValidationError> {
		let Some(private_key) = &self.private_key else {
			return Ok(());
		};

		if !private_key.allowed_by(method) {
			return Err(ValidationError::CleartextNotAllowed {
				interface: self.name.clone(),
				method: method.as_str(),
			});
		}

		if let Some(decoded) = private_key.cleartext_key() {
			let key = decoded.map_err(|source| ValidationError::PrivateKey {
				interface: self.name.clone(),
				source,
			})?;
			if key.public_key() != self.public_key {
				return Err(ValidationError::PrivateKeyMismatch(self.name.clone()));
			}
			warn!(interface = %self.name, "using insecure cleartext private key");
		}

		Ok(())
	}
}
