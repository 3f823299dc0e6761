// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use wgf_common_config::UserInput;

use crate::error::ControllerError;
use crate::state::RunState;

/// One step of a phase. Controllers run in registration order and record
/// per-item failures in `state.report`; an `Err` means the step as a whole
/// could not run.
#[async_trait]
pub trait Controller: Send + Sync {
	fn name(&self) -> &'static str;

	async fn execute(&self, input: &UserInput, state: &mut RunState) -> Result<(), ControllerError>;
}
