// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! LATE controllers. Everything here is reported, never fatal.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use wgf_common_config::UserInput;
use wgf_state::InterfaceState;
use wgf_transform::ConfigurationSource;

use crate::audit::DigestAuditTask;
use crate::controller::Controller;
use crate::error::ControllerError;
use crate::phase::Phase;
use crate::report::ReportKind;
use crate::state::RunState;

/// Reads every persisted interface back through the verifying loaders and
/// checks it matches what the table holds.
pub struct VerifyDigests;

#[async_trait]
impl Controller for VerifyDigests {
	fn name(&self) -> &'static str {
		"verify-digests"
	}

	#[instrument(skip_all)]
	async fn execute(&self, _input: &UserInput, state: &mut RunState) -> Result<(), ControllerError> {
		let persisted: Vec<(String, PathBuf)> = state
			.table
			.names()
			.into_iter()
			.filter(|name| state.table.state(name) == InterfaceState::Persisted)
			.filter_map(|name| {
				let path = state.table.get(&name)?.persisted_path()?.to_path_buf();
				Some((name, path))
			})
			.collect();

		let mut verified = 0usize;
		for (name, path) in persisted {
			let source = ConfigurationSource::File(path);
			let on_disk = match state.state_loaders.load(&source).await {
				Ok((map, _)) => map,
				Err(e) => {
					state.report.record(Phase::Late, &name, ReportKind::Digest, &e);
					continue;
				}
			};

			let expected = state
				.table
				.get(&name)
				.and_then(|e| e.current())
				.map(|c| c.to_map());
			match expected {
				Some(Ok(expected)) if expected == on_disk => verified += 1,
				Some(Ok(_)) => state.report.record(
					Phase::Late,
					&name,
					ReportKind::Digest,
					format!("{} does not match reconciled state", source.identity()),
				),
				Some(Err(e)) => state.report.record(Phase::Late, &name, ReportKind::Digest, &e),
				None => {}
			}
		}

		info!(verified, "persisted state verified");
		Ok(())
	}
}

/// Removes temp files left by interrupted writes and digests whose config
/// file is gone.
pub struct Cleanup;

#[async_trait]
impl Controller for Cleanup {
	fn name(&self) -> &'static str {
		"cleanup"
	}

	#[instrument(skip_all)]
	async fn execute(&self, _input: &UserInput, state: &mut RunState) -> Result<(), ControllerError> {
		let strays = match state.location.strays() {
			Ok(strays) => strays,
			Err(e) => {
				state.report.record(
					Phase::Late,
					state.location.dir().display().to_string(),
					ReportKind::Cleanup,
					&e,
				);
				return Ok(());
			}
		};

		for path in strays {
			match tokio::fs::remove_file(&path).await {
				Ok(()) => debug!(path = %path.display(), "removed stray file"),
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
				Err(e) => state.report.record(
					Phase::Late,
					path.display().to_string(),
					ReportKind::Cleanup,
					&e,
				),
			}
		}
		Ok(())
	}
}

/// Registers the periodic digest audit when an interval is configured.
pub struct ScheduleDigestAudit;

#[async_trait]
impl Controller for ScheduleDigestAudit {
	fn name(&self) -> &'static str {
		"schedule-digest-audit"
	}

	async fn execute(&self, input: &UserInput, state: &mut RunState) -> Result<(), ControllerError> {
		let Some(interval) = input.audit_interval else {
			return Ok(());
		};

		let task = DigestAuditTask::new(state.location.clone(), state.digester.clone());
		if let Err(e) = state.scheduler.register_periodic(Arc::new(task), interval) {
			state
				.report
				.record(Phase::Late, DigestAuditTask::ID, ReportKind::Schedule, &e);
		}
		Ok(())
	}
}
