// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::context::TaskContext;
use crate::error::TaskError;
use async_trait::async_trait;

/// Background work registered while the controller phases run and started
/// once they are done.
#[async_trait]
pub trait DelayedTask: Send + Sync {
	fn id(&self) -> &str;

	fn name(&self) -> &str;

	/// Checked by `start_all` before the task is spawned. A task that is not
	/// ready is recorded as failed and never runs.
	fn ready(&self) -> Result<(), TaskError> {
		Ok(())
	}

	async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError>;
}
