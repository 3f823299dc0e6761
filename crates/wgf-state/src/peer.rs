// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::keys::WgPublicKey;

/// One remote peer of an interface. Field order is the serialized order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PeerRecord {
	pub public_key: WgPublicKey,

	#[serde(default)]
	pub allowed_ips: Vec<IpNet>,

	/// `host:port`, left unresolved.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub endpoint: Option<String>,
}

impl PeerRecord {
	pub fn new(public_key: WgPublicKey) -> Self {
		Self {
			public_key,
			allowed_ips: Vec::new(),
			endpoint: None,
		}
	}

	pub fn with_allowed_ip(mut self, net: IpNet) -> Self {
		self.allowed_ips.push(net);
		self
	}

	pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
		self.endpoint = Some(endpoint.into());
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::keys::WgKeyPair;
	use serde_json::json;

	#[test]
	fn parses_minimal_peer() {
		let key = WgKeyPair::generate().public;
		let peer: PeerRecord = serde_json::from_value(json!({ "public_key": key.to_base64() })).unwrap();
		assert_eq!(peer, PeerRecord::new(key));
	}

	#[test]
	fn keeps_allowed_ip_order() {
		let key = WgKeyPair::generate().public;
		let peer: PeerRecord = serde_json::from_value(json!({
			"public_key": key.to_base64(),
			"allowed_ips": ["10.0.0.2/32", "fd00::/64", "10.1.0.0/16"],
			"endpoint": "peer.example.net:51820",
		}))
		.unwrap();

		let rendered: Vec<String> = peer.allowed_ips.iter().map(|n| n.to_string()).collect();
		assert_eq!(rendered, vec!["10.0.0.2/32", "fd00::/64", "10.1.0.0/16"]);
		assert_eq!(peer.endpoint.as_deref(), Some("peer.example.net:51820"));
	}

	#[test]
	fn rejects_bad_network_and_unknown_field() {
		let key = WgKeyPair::generate().public.to_base64();
		assert!(serde_json::from_value::<PeerRecord>(json!({
			"public_key": key,
			"allowed_ips": ["10.0.0.300/32"],
		}))
		.is_err());
		assert!(serde_json::from_value::<PeerRecord>(json!({
			"public_key": key,
			"persistent_keepalive": 25,
		}))
		.is_err());
	}
}
