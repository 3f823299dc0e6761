// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Delayed tasks for the federation control plane.
//!
//! Tasks are registered while the controller phases run and are started
//! together by [`DelayedTaskScheduler::start_all`] once the phases are done.
//! One-shot tasks run once (with retries for retryable failures); periodic
//! tasks run every interval until [`DelayedTaskScheduler::shutdown`].

pub mod context;
pub mod error;
pub mod scheduler;
pub mod task;
pub mod types;

pub use context::{CancellationToken, TaskContext};
pub use error::{Result, SchedulerError, TaskError};
pub use scheduler::DelayedTaskScheduler;
pub use task::DelayedTask;
pub use types::{RetryPolicy, StartSummary, TaskRun, TaskSchedule, TaskStatus};
