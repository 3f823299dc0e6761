// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use wgf_jobs::{DelayedTask, TaskContext, TaskError};
use wgf_transform::{Digester, StateLocation};

/// Periodically re-checks every persisted state file against its digest.
/// Works on the directory alone; it never sees the reconciliation table.
pub struct DigestAuditTask {
	location: StateLocation,
	digester: Digester,
}

impl DigestAuditTask {
	pub const ID: &'static str = "digest-audit";

	pub fn new(location: StateLocation, digester: Digester) -> Self {
		Self { location, digester }
	}
}

#[async_trait]
impl DelayedTask for DigestAuditTask {
	fn id(&self) -> &str {
		Self::ID
	}

	fn name(&self) -> &str {
		"Digest audit"
	}

	#[instrument(skip_all, fields(run_id = %ctx.run_id))]
	async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError> {
		let files = self
			.location
			.persisted()
			.map_err(|e| TaskError::retryable(format!("listing {}: {e}", self.location.dir().display())))?;

		let mut failed = 0usize;
		for path in &files {
			if ctx.cancellation_token.is_cancelled() {
				return Err(TaskError::Cancelled);
			}
			if let Err(e) = self.digester.verify_file(path).await {
				warn!(path = %path.display(), error = %e, "persisted state failed digest audit");
				failed += 1;
			}
		}

		info!(checked = files.len(), failed, "digest audit finished");
		if failed > 0 {
			return Err(TaskError::fatal(format!("{failed} state file(s) failed verification")));
		}
		Ok(())
	}
}
