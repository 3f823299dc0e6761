// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;
use std::sync::Arc;

use crate::configuration::WireguardConfiguration;

/// Lifecycle events of an interface configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
	ConfigurationFileLoaded,
	BeforeCreate,
	Created,
	BeforeUpdate,
	Updated,
	BeforeDelete,
	Deleted,
}

impl EventKind {
	pub const ALL: [EventKind; 7] = [
		EventKind::ConfigurationFileLoaded,
		EventKind::BeforeCreate,
		EventKind::Created,
		EventKind::BeforeUpdate,
		EventKind::Updated,
		EventKind::BeforeDelete,
		EventKind::Deleted,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			EventKind::ConfigurationFileLoaded => "CONFIGURATION_FILE_LOADED",
			EventKind::BeforeCreate => "CONFIGURATION_FILE_BEFORE_CREATE",
			EventKind::Created => "CONFIGURATION_FILE_CREATED",
			EventKind::BeforeUpdate => "CONFIGURATION_FILE_BEFORE_UPDATE",
			EventKind::Updated => "CONFIGURATION_FILE_UPDATED",
			EventKind::BeforeDelete => "CONFIGURATION_FILE_BEFORE_DELETE",
			EventKind::Deleted => "CONFIGURATION_FILE_DELETED",
		}
	}

	/// `BEFORE_*` events gate their transition: every subscriber has to
	/// accept it or the transition is not applied.
	pub fn requires_ack(&self) -> bool {
		matches!(
			self,
			EventKind::BeforeCreate | EventKind::BeforeUpdate | EventKind::BeforeDelete
		)
	}
}

impl fmt::Display for EventKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// An event and the configuration snapshot it is about.
#[derive(Debug, Clone)]
pub struct Event {
	kind: EventKind,
	configuration: Arc<WireguardConfiguration>,
}

impl Event {
	pub fn new(kind: EventKind, configuration: &WireguardConfiguration) -> Self {
		Self {
			kind,
			configuration: Arc::new(configuration.clone()),
		}
	}

	pub fn kind(&self) -> EventKind {
		self.kind
	}

	pub fn requires_ack(&self) -> bool {
		self.kind.requires_ack()
	}

	pub fn configuration(&self) -> &WireguardConfiguration {
		&self.configuration
	}

	pub fn interface(&self) -> &str {
		&self.configuration.name
	}
}
