// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! MAIN controllers: reload persisted state, load sources and reconcile them
//! against it, then persist the result.

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use wgf_common_config::UserInput;
use wgf_state::{Event, EventKind, InterfaceState, ReconcileKind, Transition, WireguardConfiguration};
use wgf_transform::{ConfigurationSource, LoadError};

use crate::controller::Controller;
use crate::error::ControllerError;
use crate::phase::Phase;
use crate::report::ReportKind;
use crate::state::RunState;

fn file_stem(path: &Path) -> Option<String> {
	path.file_stem().and_then(|s| s.to_str()).map(str::to_string)
}

/// Name an interface falls back to when its mapping has no `interface` key.
fn fallback_name(source: &ConfigurationSource) -> Option<String> {
	match source {
		ConfigurationSource::File(path) => file_stem(path),
		ConfigurationSource::Remote(url) => url
			.path_segments()
			.and_then(|mut segments| segments.next_back())
			.filter(|segment| !segment.is_empty())
			.and_then(|segment| file_stem(Path::new(segment))),
		ConfigurationSource::Environment { .. } => None,
	}
}

fn digest_failure(error: &LoadError) -> bool {
	matches!(error, LoadError::DigestMissing { .. } | LoadError::DigestMismatch { .. })
}

/// Reloads every persisted state file through the verifying loaders. State
/// that fails verification is quarantined: reported, and neither updated nor
/// deleted this run.
pub struct LoadPriorState;

#[async_trait]
impl Controller for LoadPriorState {
	fn name(&self) -> &'static str {
		"load-prior-state"
	}

	#[instrument(skip_all)]
	async fn execute(&self, _input: &UserInput, state: &mut RunState) -> Result<(), ControllerError> {
		let files = state
			.location
			.persisted()
			.map_err(|e| ControllerError::io(format!("listing {}", state.location.dir().display()), e))?;

		for path in files {
			let Some(stem) = file_stem(&path) else {
				continue;
			};
			let source = ConfigurationSource::File(path.clone());

			let map = match state.state_loaders.load(&source).await {
				Ok((map, _)) => map,
				Err(e) => {
					let kind = if digest_failure(&e) {
						ReportKind::Digest
					} else {
						ReportKind::Load
					};
					state.report.record(Phase::Main, source.identity(), kind, &e);
					state.quarantined.insert(stem);
					continue;
				}
			};

			let config = match WireguardConfiguration::from_map(map, Some(&stem)) {
				Ok(config) => config,
				Err(e) => {
					state
						.report
						.record(Phase::Main, source.identity(), ReportKind::Validation, &e);
					state.quarantined.insert(stem);
					continue;
				}
			};

			if state.table.get(&config.name).is_some() {
				state.report.record(
					Phase::Main,
					source.identity(),
					ReportKind::Load,
					format!("interface {} already has persisted state", config.name),
				);
				continue;
			}

			debug!(interface = %config.name, revision = config.revision, "prior state loaded");
			state.table.track_persisted(config, path);
		}

		info!(interfaces = state.table.len(), "prior state loaded");
		Ok(())
	}
}

/// Loads every source, then walks interfaces in name order and applies the
/// resulting create, update or delete transitions.
pub struct Reconcile;

impl Reconcile {
	async fn load_sources(&self, input: &UserInput, state: &mut RunState) {
		let sources = state.sources.clone();
		let declared: BTreeSet<String> = input
			.sources
			.iter()
			.map(|raw| ConfigurationSource::parse(raw).identity())
			.collect();

		for source in &sources {
			let identity = source.identity();

			let map = match state.source_loaders.load(source).await {
				Ok((map, loader)) => {
					debug!(source = %identity, loader, "source loaded");
					map
				}
				// A discovered file that has since disappeared. Declared sources
				// and files that still exist are failures, which keep their
				// interfaces.
				Err(e)
					if e.is_unsupported()
						&& !declared.contains(&identity)
						&& !source.path().is_some_and(Path::exists) =>
				{
					debug!(source = %identity, "source not present");
					continue;
				}
				Err(e) => {
					state.report.record(Phase::Main, &identity, ReportKind::Load, &e);
					state.failed_sources.insert(identity);
					continue;
				}
			};

			let fallback = fallback_name(source);
			let config = match WireguardConfiguration::from_map(map, fallback.as_deref()).and_then(|c| {
				c.validate_private_key(input.private_key_retrieval_method)?;
				Ok(c)
			}) {
				Ok(config) => config,
				Err(e) => {
					state
						.report
						.record(Phase::Main, &identity, ReportKind::Validation, &e);
					state.failed_sources.insert(identity);
					continue;
				}
			};

			let name = config.name.clone();
			if state.quarantined.contains(&name) {
				debug!(interface = %name, "skipping quarantined interface");
				continue;
			}

			match state.table.track_loaded(config, &identity) {
				Ok(true) => {
					let loaded = state.table.get(&name).and_then(|e| e.loaded()).cloned();
					if let Some(loaded) = loaded {
						state.dispatch(
							Phase::Main,
							&Event::new(EventKind::ConfigurationFileLoaded, &loaded),
						);
					}
				}
				Ok(false) => debug!(interface = %name, "source unchanged"),
				Err(conflict) => state.report.conflict(conflict),
			}
		}
	}

	fn allow_delete(state: &RunState, name: &str) -> bool {
		state
			.table
			.get(name)
			.and_then(|e| e.current())
			.and_then(|c| c.source.as_deref())
			.map_or(true, |source| !state.failed_sources.contains(source))
	}

	/// Dispatch the BEFORE event and, unless vetoed, move the entry to
	/// RECONCILED or DELETED. The AFTER event waits for [`Persist`].
	fn apply(state: &mut RunState, transition: Transition) {
		let before = match &transition {
			Transition::Create(_) => EventKind::BeforeCreate,
			Transition::Update { .. } => EventKind::BeforeUpdate,
			Transition::Delete(_) => EventKind::BeforeDelete,
		};
		let config = transition.configuration();

		if !state.dispatch(Phase::Main, &Event::new(before, config)) {
			info!(interface = %config.name, kind = %before, "transition vetoed by subscriber");
			return;
		}

		state.table.apply(&transition);
	}
}

#[async_trait]
impl Controller for Reconcile {
	fn name(&self) -> &'static str {
		"reconcile"
	}

	#[instrument(skip_all)]
	async fn execute(&self, input: &UserInput, state: &mut RunState) -> Result<(), ControllerError> {
		self.load_sources(input, state).await;

		for name in state.table.names() {
			if state.quarantined.contains(&name) {
				continue;
			}
			let allow_delete = Self::allow_delete(state, &name);
			if let Some(transition) = state.table.plan(&name, allow_delete) {
				Self::apply(state, transition);
			}
		}
		Ok(())
	}
}

/// Saves reconciled entities and removes deleted ones, dispatching CREATED,
/// UPDATED or DELETED only once the disk reflects the transition. A failed
/// save leaves the entity RECONCILED with no AFTER event; the next run
/// recomputes and retries it.
pub struct Persist;

#[async_trait]
impl Controller for Persist {
	fn name(&self) -> &'static str {
		"persist"
	}

	#[instrument(skip_all)]
	async fn execute(&self, _input: &UserInput, state: &mut RunState) -> Result<(), ControllerError> {
		for (name, entry_state) in state.table.pending() {
			match entry_state {
				InterfaceState::Reconciled(kind) => save(state, &name, kind).await,
				InterfaceState::Deleted => remove(state, &name).await,
				_ => {}
			}
		}
		Ok(())
	}
}

async fn save(state: &mut RunState, name: &str, kind: ReconcileKind) {
	let Some(entry) = state.table.get(name) else {
		return;
	};
	let Some(config) = entry.current().cloned() else {
		return;
	};
	let previous_path = entry.persisted_path().map(Path::to_path_buf);
	let path = state.location.config_path(name);

	let map = match config.to_map() {
		Ok(map) => map,
		Err(e) => {
			state.report.record(Phase::Main, name, ReportKind::Save, &e);
			return;
		}
	};

	if let Err(e) = state.state_savers.save(&map, &path).await {
		state.report.record(Phase::Main, e.identity().to_string(), ReportKind::Save, &e);
		return;
	}

	// State written in another format by an earlier run.
	if let Some(previous) = previous_path.filter(|p| p != &path) {
		if let Err(e) = state.state_savers.remove(&previous).await {
			state.report.record(Phase::Main, e.identity().to_string(), ReportKind::Remove, &e);
		}
	}

	if !state.table.mark_persisted(name, path) {
		return;
	}

	let after = match kind {
		ReconcileKind::Created => EventKind::Created,
		ReconcileKind::Updated => EventKind::Updated,
	};
	state.report.transition(name, after, config.revision);
	state.dispatch(Phase::Main, &Event::new(after, &config));
}

async fn remove(state: &mut RunState, name: &str) {
	let path = state
		.table
		.get(name)
		.and_then(|e| e.persisted_path().map(Path::to_path_buf))
		.unwrap_or_else(|| state.location.config_path(name));

	if let Err(e) = state.state_savers.remove(&path).await {
		state.report.record(Phase::Main, e.identity().to_string(), ReportKind::Remove, &e);
		return;
	}
	debug!(interface = %name, path = %path.display(), "state removed");

	let Some(config) = state.table.mark_absent(name).and_then(|e| e.current().cloned()) else {
		return;
	};
	state.report.transition(name, EventKind::Deleted, config.revision);
	state.dispatch(Phase::Main, &Event::new(EventKind::Deleted, &config));
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fallback_names_follow_source_kind() {
		assert_eq!(
			fallback_name(&ConfigurationSource::File("/etc/wgf/wg3.toml".into())),
			Some("wg3".to_string())
		);
		assert_eq!(
			fallback_name(&ConfigurationSource::parse("https://hq.example.net/interfaces/wg4.json")),
			Some("wg4".to_string())
		);
		assert_eq!(
			fallback_name(&ConfigurationSource::Environment {
				prefix: "WG0_".into()
			}),
			None
		);
	}
}
