// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{error, info, instrument};
use wgf_common_config::UserInput;
use wgf_jobs::StartSummary;
use wgf_transform::LockMode;

use crate::baseline::{AcquireRunLock, ResolveRootPassphrase, SourceDiscovery, ValidateInput};
use crate::controller::Controller;
use crate::error::{BaselineValidationError, ControllerError};
use crate::late::{Cleanup, ScheduleDigestAudit, VerifyDigests};
use crate::phase::Phase;
use crate::reconcile::{LoadPriorState, Persist, Reconcile};
use crate::report::ReportKind;
use crate::state::RunState;

/// Runs BASELINE, MAIN and LATE in order. Every phase always runs unless
/// BASELINE fails; within a phase controllers run in registration order.
#[derive(Default)]
pub struct ControllerPhaseOrchestrator {
	controllers: BTreeMap<Phase, Vec<Arc<dyn Controller>>>,
}

impl ControllerPhaseOrchestrator {
	pub fn new() -> Self {
		Self::default()
	}

	/// The built-in controllers. `lock_mode` is shared for read-only runs.
	pub fn with_defaults(lock_mode: LockMode) -> Self {
		let mut orchestrator = Self::new();

		orchestrator.register(Phase::Baseline, Arc::new(ValidateInput));
		orchestrator.register(Phase::Baseline, Arc::new(ResolveRootPassphrase));
		orchestrator.register(Phase::Baseline, Arc::new(AcquireRunLock::new(lock_mode)));
		orchestrator.register(Phase::Baseline, Arc::new(SourceDiscovery));

		orchestrator.register(Phase::Main, Arc::new(LoadPriorState));
		orchestrator.register(Phase::Main, Arc::new(Reconcile));
		orchestrator.register(Phase::Main, Arc::new(Persist));

		orchestrator.register(Phase::Late, Arc::new(VerifyDigests));
		orchestrator.register(Phase::Late, Arc::new(Cleanup));
		orchestrator.register(Phase::Late, Arc::new(ScheduleDigestAudit));

		orchestrator
	}

	pub fn register(&mut self, phase: Phase, controller: Arc<dyn Controller>) {
		self.controllers.entry(phase).or_default().push(controller);
	}

	pub fn controller_names(&self, phase: Phase) -> Vec<&'static str> {
		self.controllers
			.get(&phase)
			.map(|list| list.iter().map(|c| c.name()).collect())
			.unwrap_or_default()
	}

	fn phase(&self, phase: Phase) -> &[Arc<dyn Controller>] {
		self.controllers.get(&phase).map(Vec::as_slice).unwrap_or(&[])
	}

	/// Stops at the first failing controller.
	#[instrument(skip_all)]
	pub async fn run_baseline(&self, input: &UserInput, state: &mut RunState) -> Result<(), BaselineValidationError> {
		for controller in self.phase(Phase::Baseline) {
			if let Err(source) = controller.execute(input, state).await {
				error!(controller = controller.name(), error = %source, "baseline failed");
				return Err(BaselineValidationError {
					controller: controller.name(),
					source,
				});
			}
		}
		info!(phase = %Phase::Baseline, "phase complete");
		Ok(())
	}

	/// MAIN and LATE: a failing controller is recorded and the next one runs.
	async fn run_recorded(&self, phase: Phase, input: &UserInput, state: &mut RunState) {
		for controller in self.phase(phase) {
			if let Err(e) = controller.execute(input, state).await {
				state.report.record(phase, controller.name(), ReportKind::Controller, &e);
			}
		}
		info!(phase = %phase, "phase complete");
	}

	/// One full run. The run lock is released before returning, whatever the
	/// outcome.
	#[instrument(skip_all)]
	pub async fn run(&self, input: &UserInput, state: &mut RunState) -> Result<(), BaselineValidationError> {
		if let Err(e) = self.run_baseline(input, state).await {
			state.release_lock();
			return Err(e);
		}

		self.run_recorded(Phase::Main, input, state).await;
		self.run_recorded(Phase::Late, input, state).await;
		state.release_lock();

		info!(
			transitions = state.report.transitions().len(),
			errors = state.report.entries().len(),
			conflicts = state.report.conflicts().len(),
			"run complete"
		);
		Ok(())
	}

	/// Start the delayed tasks registered during the run. Only valid once
	/// every phase is done.
	pub fn start_tasks(&self, state: &RunState) -> Result<StartSummary, ControllerError> {
		Ok(state.scheduler.start_all()?)
	}
}
