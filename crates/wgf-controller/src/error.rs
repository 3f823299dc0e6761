// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use thiserror::Error;
use wgf_common_config::ConfigError;
use wgf_jobs::SchedulerError;
use wgf_transform::LockError;

/// A controller could not do its job at all. Per-item failures are recorded in
/// the run report instead.
#[derive(Debug, Error)]
pub enum ControllerError {
	#[error("invalid user input: {0}")]
	Input(#[from] ConfigError),

	#[error(transparent)]
	Lock(#[from] LockError),

	#[error("source directory {path}: {message}")]
	SourceDir { path: PathBuf, message: String },

	#[error("{context}: {source}")]
	Io {
		context: String,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	Scheduler(#[from] SchedulerError),

	#[error("root passphrase command: {0}")]
	Passphrase(String),
}

impl ControllerError {
	pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
		Self::Io {
			context: context.into(),
			source,
		}
	}
}

/// BASELINE failed; nothing was mutated.
#[derive(Debug, Error)]
#[error("baseline controller {controller} failed: {source}")]
pub struct BaselineValidationError {
	pub controller: &'static str,
	#[source]
	pub source: ControllerError,
}
