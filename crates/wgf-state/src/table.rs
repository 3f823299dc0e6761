// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-run reconciliation table.
//!
//! Each interface moves through
//!
//! ```text
//! ABSENT -> LOADED -> RECONCILED(CREATED | UPDATED) -> PERSISTED
//!                     RECONCILED -> DELETED -> ABSENT
//! ```
//!
//! The table only tracks state; it never performs I/O and never dispatches
//! events. Entries are kept in a `BTreeMap` so every walk is in interface
//! name order.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::configuration::WireguardConfiguration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileKind {
	Created,
	Updated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceState {
	Absent,
	Loaded,
	Reconciled(ReconcileKind),
	Persisted,
	Deleted,
}

impl fmt::Display for InterfaceState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			InterfaceState::Absent => f.write_str("ABSENT"),
			InterfaceState::Loaded => f.write_str("LOADED"),
			InterfaceState::Reconciled(ReconcileKind::Created) => f.write_str("RECONCILED(CREATED)"),
			InterfaceState::Reconciled(ReconcileKind::Updated) => f.write_str("RECONCILED(UPDATED)"),
			InterfaceState::Persisted => f.write_str("PERSISTED"),
			InterfaceState::Deleted => f.write_str("DELETED"),
		}
	}
}

/// A second source claimed an interface that an earlier source already
/// provided this run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("interface {interface} from {ignored} ignored, already provided by {kept}")]
pub struct SourceConflict {
	pub interface: String,
	pub kept: String,
	pub ignored: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
	Create(WireguardConfiguration),
	Update {
		previous: WireguardConfiguration,
		next: WireguardConfiguration,
	},
	Delete(WireguardConfiguration),
}

impl Transition {
	pub fn interface(&self) -> &str {
		&self.configuration().name
	}

	/// The configuration the transition leaves behind (for deletes, the one
	/// being removed).
	pub fn configuration(&self) -> &WireguardConfiguration {
		match self {
			Transition::Create(config) | Transition::Delete(config) => config,
			Transition::Update { next, .. } => next,
		}
	}
}

#[derive(Debug, Clone)]
pub struct TrackedInterface {
	persisted: Option<WireguardConfiguration>,
	persisted_path: Option<PathBuf>,
	loaded: Option<WireguardConfiguration>,
	loaded_from: Option<String>,
	current: Option<WireguardConfiguration>,
	state: InterfaceState,
}

impl TrackedInterface {
	fn absent() -> Self {
		Self {
			persisted: None,
			persisted_path: None,
			loaded: None,
			loaded_from: None,
			current: None,
			state: InterfaceState::Absent,
		}
	}

	pub fn state(&self) -> InterfaceState {
		self.state
	}

	/// State as of the last successful save.
	pub fn persisted(&self) -> Option<&WireguardConfiguration> {
		self.persisted.as_ref()
	}

	pub fn persisted_path(&self) -> Option<&Path> {
		self.persisted_path.as_deref()
	}

	pub fn loaded(&self) -> Option<&WireguardConfiguration> {
		self.loaded.as_ref()
	}

	pub fn loaded_from(&self) -> Option<&str> {
		self.loaded_from.as_deref()
	}

	/// The reconciled entity.
	pub fn current(&self) -> Option<&WireguardConfiguration> {
		self.current.as_ref()
	}
}

#[derive(Debug, Default)]
pub struct ReconciliationTable {
	entries: BTreeMap<String, TrackedInterface>,
}

impl ReconciliationTable {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	pub fn names(&self) -> Vec<String> {
		self.entries.keys().cloned().collect()
	}

	pub fn get(&self, name: &str) -> Option<&TrackedInterface> {
		self.entries.get(name)
	}

	pub fn state(&self, name: &str) -> InterfaceState {
		self.entries.get(name).map_or(InterfaceState::Absent, |e| e.state)
	}

	/// Record state reloaded from the state directory.
	pub fn track_persisted(&mut self, config: WireguardConfiguration, path: PathBuf) {
		let entry = self
			.entries
			.entry(config.name.clone())
			.or_insert_with(TrackedInterface::absent);
		entry.persisted = Some(config.clone());
		entry.persisted_path = Some(path);
		entry.current = Some(config);
		entry.state = InterfaceState::Persisted;
	}

	/// Record a configuration loaded from `source`. The first source to
	/// provide an interface keeps it.
	///
	/// Returns whether the loaded configuration is new or differs from the
	/// reconciled entity; an unchanged interface stays PERSISTED.
	pub fn track_loaded(
		&mut self,
		mut config: WireguardConfiguration,
		source: &str,
	) -> Result<bool, SourceConflict> {
		let entry = self
			.entries
			.entry(config.name.clone())
			.or_insert_with(TrackedInterface::absent);

		if let Some(kept) = &entry.loaded_from {
			return Err(SourceConflict {
				interface: config.name,
				kept: kept.clone(),
				ignored: source.to_string(),
			});
		}

		config.source = Some(source.to_string());
		let changed = match &entry.current {
			Some(current) => !current.same_state_as(&config),
			None => true,
		};

		if changed {
			entry.state = InterfaceState::Loaded;
		}
		entry.loaded = Some(config);
		entry.loaded_from = Some(source.to_string());
		Ok(changed)
	}

	/// Compute the transition for `name`, if any.
	///
	/// `allow_delete` is false when the source that produced the persisted
	/// state could not be read this run; such interfaces are left alone.
	pub fn plan(&self, name: &str, allow_delete: bool) -> Option<Transition> {
		let entry = self.entries.get(name)?;

		match (&entry.loaded, &entry.current) {
			(Some(loaded), None) => Some(Transition::Create(loaded.clone().with_revision(0))),
			(Some(loaded), Some(current)) if !current.same_state_as(loaded) => Some(Transition::Update {
				previous: current.clone(),
				next: loaded.clone().with_revision(current.revision + 1),
			}),
			(Some(_), Some(_)) => None,
			(None, Some(current)) if allow_delete && entry.state != InterfaceState::Deleted => {
				Some(Transition::Delete(current.clone()))
			}
			(None, _) => None,
		}
	}

	pub fn apply(&mut self, transition: &Transition) {
		let entry = self
			.entries
			.entry(transition.interface().to_string())
			.or_insert_with(TrackedInterface::absent);

		match transition {
			Transition::Create(config) => {
				entry.current = Some(config.clone());
				entry.state = InterfaceState::Reconciled(ReconcileKind::Created);
			}
			Transition::Update { next, .. } => {
				entry.current = Some(next.clone());
				entry.state = InterfaceState::Reconciled(ReconcileKind::Updated);
			}
			Transition::Delete(_) => {
				entry.state = InterfaceState::Deleted;
			}
		}
	}

	/// RECONCILED -> PERSISTED after a successful save to `path`.
	pub fn mark_persisted(&mut self, name: &str, path: PathBuf) -> bool {
		let Some(entry) = self.entries.get_mut(name) else {
			return false;
		};
		if !matches!(entry.state, InterfaceState::Reconciled(_)) {
			return false;
		}
		entry.persisted = entry.current.clone();
		entry.persisted_path = Some(path);
		entry.state = InterfaceState::Persisted;
		true
	}

	/// DELETED -> ABSENT once the persisted artifacts are gone.
	pub fn mark_absent(&mut self, name: &str) -> Option<TrackedInterface> {
		match self.entries.get(name) {
			Some(entry) if entry.state == InterfaceState::Deleted => self.entries.remove(name),
			_ => None,
		}
	}

	/// Interfaces with unsaved transitions, in name order.
	pub fn pending(&self) -> Vec<(String, InterfaceState)> {
		self.entries
			.iter()
			.filter(|(_, e)| matches!(e.state, InterfaceState::Reconciled(_) | InterfaceState::Deleted))
			.map(|(name, e)| (name.clone(), e.state))
			.collect()
	}

	/// Reconciled entities that still exist, in name order.
	pub fn entities(&self) -> impl Iterator<Item = (&str, &WireguardConfiguration)> {
		self.entries.iter().filter_map(|(name, e)| match e.state {
			InterfaceState::Deleted | InterfaceState::Absent => None,
			_ => e.current.as_ref().map(|c| (name.as_str(), c)),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::keys::{WgKeyPair, WgPublicKey};
	use proptest::prelude::*;

	fn config(port: u16) -> WireguardConfiguration {
		WireguardConfiguration::new("wg0", WgPublicKey::from_bytes([7; 32]), port)
	}

	#[test]
	fn new_source_creates_at_revision_zero() {
		let mut table = ReconciliationTable::new();
		assert!(table.track_loaded(config(51820).with_revision(5), "/src/wg0.json").unwrap());
		assert_eq!(table.state("wg0"), InterfaceState::Loaded);

		let transition = table.plan("wg0", true).unwrap();
		let Transition::Create(created) = &transition else {
			panic!("expected create, got {transition:?}");
		};
		assert_eq!(created.revision, 0);
		assert_eq!(created.source.as_deref(), Some("/src/wg0.json"));

		table.apply(&transition);
		assert_eq!(table.state("wg0"), InterfaceState::Reconciled(ReconcileKind::Created));
		assert_eq!(table.pending().len(), 1);

		assert!(table.mark_persisted("wg0", PathBuf::from("/state/wg0.json")));
		assert_eq!(table.state("wg0"), InterfaceState::Persisted);
		assert!(table.pending().is_empty());
	}

	#[test]
	fn changed_source_updates_with_next_revision() {
		let mut table = ReconciliationTable::new();
		let mut prior = config(51820);
		prior.source = Some("/src/wg0.json".into());
		table.track_persisted(prior, PathBuf::from("/state/wg0.json"));

		assert!(table.track_loaded(config(51821), "/src/wg0.json").unwrap());
		let transition = table.plan("wg0", true).unwrap();
		match &transition {
			Transition::Update { previous, next } => {
				assert_eq!(previous.revision, 0);
				assert_eq!(next.revision, 1);
				assert_eq!(next.listen_port, 51821);
			}
			other => panic!("expected update, got {other:?}"),
		}
	}

	#[test]
	fn unchanged_source_plans_nothing() {
		let mut table = ReconciliationTable::new();
		let mut prior = config(51820).with_revision(3);
		prior.source = Some("/src/wg0.json".into());
		table.track_persisted(prior, PathBuf::from("/state/wg0.json"));

		assert!(!table.track_loaded(config(51820), "/src/wg0.json").unwrap());
		assert_eq!(table.state("wg0"), InterfaceState::Persisted);
		assert_eq!(table.plan("wg0", true), None);
	}

	#[test]
	fn missing_source_deletes_only_when_allowed() {
		let mut table = ReconciliationTable::new();
		table.track_persisted(config(51820), PathBuf::from("/state/wg0.json"));

		assert_eq!(table.plan("wg0", false), None);

		let transition = table.plan("wg0", true).unwrap();
		assert!(matches!(transition, Transition::Delete(_)));
		table.apply(&transition);
		assert_eq!(table.state("wg0"), InterfaceState::Deleted);
		assert_eq!(table.plan("wg0", true), None);
		assert_eq!(table.entities().count(), 0);

		let removed = table.mark_absent("wg0").unwrap();
		assert_eq!(removed.persisted_path(), Some(Path::new("/state/wg0.json")));
		assert_eq!(table.state("wg0"), InterfaceState::Absent);
		assert!(table.is_empty());
	}

	#[test]
	fn second_source_for_interface_conflicts() {
		let mut table = ReconciliationTable::new();
		table.track_loaded(config(51820), "/src/a.json").unwrap();

		let conflict = table.track_loaded(config(51999), "/src/b.json").unwrap_err();
		assert_eq!(
			conflict,
			SourceConflict {
				interface: "wg0".into(),
				kept: "/src/a.json".into(),
				ignored: "/src/b.json".into(),
			}
		);
		assert_eq!(table.get("wg0").unwrap().loaded().unwrap().listen_port, 51820);
	}

	#[test]
	fn walks_in_name_order() {
		let mut table = ReconciliationTable::new();
		for name in ["wg2", "wg0", "wg1"] {
			let c = WireguardConfiguration::new(name, WgKeyPair::generate().public, 51820);
			table.track_loaded(c, name).unwrap();
		}
		assert_eq!(table.names(), vec!["wg0", "wg1", "wg2"]);
	}

	proptest! {
		#[test]
		fn revision_increases_once_per_change(ports in proptest::collection::vec(1024u16..1030, 1..20)) {
			let mut last_revision: Option<u64> = None;
			let mut last_port: Option<u16> = None;
			let mut persisted: Option<WireguardConfiguration> = None;

			for port in ports {
				let mut table = ReconciliationTable::new();
				if let Some(p) = persisted.clone() {
					table.track_persisted(p, PathBuf::from("/state/wg0.json"));
				}
				table.track_loaded(config(port), "/src/wg0.json").unwrap();

				if let Some(transition) = table.plan("wg0", true) {
					table.apply(&transition);
					table.mark_persisted("wg0", PathBuf::from("/state/wg0.json"));
				}

				let current = table.get("wg0").unwrap().current().unwrap().clone();
				match (last_revision, last_port) {
					(Some(rev), Some(prev)) if prev != port => prop_assert_eq!(current.revision, rev + 1),
					(Some(rev), Some(_)) => prop_assert_eq!(current.revision, rev),
					_ => prop_assert_eq!(current.revision, 0),
				}
				last_revision = Some(current.revision);
				last_port = Some(port);
				persisted = Some(current);
			}
		}
	}
}
