// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeSet;
use std::sync::Arc;

use wgf_common_config::{EnvSnapshot, UserInput};
use wgf_jobs::DelayedTaskScheduler;
use wgf_state::{Event, EventDispatcher, ReconciliationTable};
use wgf_transform::{
	state_loaders, state_savers, ConfigurationSource, Digester, LoaderRegistry, RunLock, SaverRegistry,
	StateCipher, StateLocation,
};

use crate::phase::Phase;
use crate::report::{ReportKind, RunReport};

/// Everything the controllers share for one run. Built once from user input;
/// there is no process-wide state.
pub struct RunState {
	pub table: ReconciliationTable,
	pub dispatcher: EventDispatcher,
	pub source_loaders: LoaderRegistry,
	pub state_loaders: LoaderRegistry,
	pub state_savers: SaverRegistry,
	pub location: StateLocation,
	pub digester: Digester,
	pub scheduler: Arc<DelayedTaskScheduler>,
	/// Filled by source discovery, in registration order.
	pub sources: Vec<ConfigurationSource>,
	/// Sources that exist but could not be loaded this run.
	pub failed_sources: BTreeSet<String>,
	/// Interfaces whose persisted state failed verification.
	pub quarantined: BTreeSet<String>,
	pub lock: Option<RunLock>,
	pub report: RunReport,
}

impl RunState {
	pub fn new(input: &UserInput, env: EnvSnapshot, scheduler: Arc<DelayedTaskScheduler>) -> Self {
		let digester = Digester::new(input.state_signing_key.as_ref());
		Self {
			table: ReconciliationTable::new(),
			dispatcher: EventDispatcher::new(),
			source_loaders: LoaderRegistry::for_sources(input.io_timeout, env),
			state_loaders: state_loaders(input.io_timeout, &digester, None),
			state_savers: state_savers(input.io_timeout, &digester, None),
			location: StateLocation::new(&input.state_dir, input.state_format),
			digester,
			scheduler,
			sources: Vec::new(),
			failed_sources: BTreeSet::new(),
			quarantined: BTreeSet::new(),
			lock: None,
			report: RunReport::new(),
		}
	}

	/// Seal persisted state under `cipher` from here on. Plain state already on
	/// disk still loads and is sealed on its next save.
	pub fn enable_encryption(&mut self, input: &UserInput, cipher: &StateCipher) {
		self.state_loaders = state_loaders(input.io_timeout, &self.digester, Some(cipher));
		self.state_savers = state_savers(input.io_timeout, &self.digester, Some(cipher));
	}

	/// Dispatch and record any subscriber failure. Returns whether every
	/// subscriber accepted the event.
	pub fn dispatch(&mut self, phase: Phase, event: &Event) -> bool {
		match self.dispatcher.dispatch(event) {
			Ok(()) => true,
			Err(e) => {
				self.report.record(phase, event.interface(), ReportKind::Handler, &e);
				false
			}
		}
	}

	pub fn release_lock(&mut self) {
		self.lock = None;
	}
}
