// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
	#[error("Task failed: {message}")]
	Failed { message: String, retryable: bool },

	#[error("Task cancelled")]
	Cancelled,
}

impl TaskError {
	pub fn fatal(message: impl Into<String>) -> Self {
		Self::Failed {
			message: message.into(),
			retryable: false,
		}
	}

	pub fn retryable(message: impl Into<String>) -> Self {
		Self::Failed {
			message: message.into(),
			retryable: true,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
	#[error("Scheduler already started")]
	AlreadyStarted,

	#[error("Task already registered: {0}")]
	DuplicateTask(String),

	#[error("No tokio runtime available to start tasks")]
	NoRuntime,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
