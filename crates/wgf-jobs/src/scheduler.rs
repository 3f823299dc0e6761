// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::context::{CancellationToken, TaskContext};
use crate::error::{Result, SchedulerError, TaskError};
use crate::task::DelayedTask;
use crate::types::{RetryPolicy, StartSummary, TaskRun, TaskSchedule, TaskStatus};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

struct RegisteredTask {
	task: Arc<dyn DelayedTask>,
	schedule: TaskSchedule,
	cancellation_token: CancellationToken,
}

#[derive(Default)]
struct SchedulerState {
	tasks: Vec<RegisteredTask>,
	started: bool,
	one_shot_handles: Vec<JoinHandle<()>>,
	periodic_handles: Vec<JoinHandle<()>>,
}

/// Collects tasks during the controller phases and starts them all at once.
///
/// Registration goes through `&self` so subscribers can hold an `Arc` to the
/// scheduler and register from inside event handlers.
pub struct DelayedTaskScheduler {
	state: Mutex<SchedulerState>,
	retry: RetryPolicy,
	shutdown_tx: broadcast::Sender<()>,
	runs: Arc<Mutex<Vec<TaskRun>>>,
}

impl DelayedTaskScheduler {
	pub fn new() -> Self {
		Self::with_retry_policy(RetryPolicy::default())
	}

	pub fn with_retry_policy(retry: RetryPolicy) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			state: Mutex::new(SchedulerState::default()),
			retry,
			shutdown_tx,
			runs: Arc::new(Mutex::new(Vec::new())),
		}
	}

	fn state(&self) -> MutexGuard<'_, SchedulerState> {
		self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	pub fn register(&self, task: Arc<dyn DelayedTask>, schedule: TaskSchedule) -> Result<()> {
		let mut state = self.state();
		if state.started {
			return Err(SchedulerError::AlreadyStarted);
		}
		if state.tasks.iter().any(|t| t.task.id() == task.id()) {
			return Err(SchedulerError::DuplicateTask(task.id().to_string()));
		}

		debug!(task_id = %task.id(), schedule = schedule.as_str(), "Registered delayed task");
		state.tasks.push(RegisteredTask {
			task,
			schedule,
			cancellation_token: CancellationToken::new(),
		});
		Ok(())
	}

	pub fn register_one_shot(&self, task: Arc<dyn DelayedTask>) -> Result<()> {
		self.register(task, TaskSchedule::OneShot)
	}

	pub fn register_periodic(&self, task: Arc<dyn DelayedTask>, interval: std::time::Duration) -> Result<()> {
		self.register(task, TaskSchedule::Periodic { interval })
	}

	pub fn contains(&self, task_id: &str) -> bool {
		self.state().tasks.iter().any(|t| t.task.id() == task_id)
	}

	pub fn task_ids(&self) -> Vec<String> {
		self.state().tasks.iter().map(|t| t.task.id().to_string()).collect()
	}

	pub fn len(&self) -> usize {
		self.state().tasks.len()
	}

	pub fn is_empty(&self) -> bool {
		self.state().tasks.is_empty()
	}

	pub fn is_started(&self) -> bool {
		self.state().started
	}

	pub fn has_periodic(&self) -> bool {
		self.state()
			.tasks
			.iter()
			.any(|t| matches!(t.schedule, TaskSchedule::Periodic { .. }))
	}

	/// Start every registered task, in registration order. Can only be called
	/// once; a task that is not ready is skipped and the rest still start.
	#[instrument(skip(self))]
	pub fn start_all(&self) -> Result<StartSummary> {
		let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;

		let mut state = self.state();
		if state.started {
			return Err(SchedulerError::AlreadyStarted);
		}
		state.started = true;

		let mut summary = StartSummary::default();
		let mut one_shots = Vec::new();
		let mut periodics = Vec::new();

		for registered in &state.tasks {
			let task_id = registered.task.id().to_string();

			if let Err(e) = registered.task.ready() {
				warn!(task_id = %task_id, error = %e, "Delayed task failed to start");
				let now = Utc::now();
				push_run(
					&self.runs,
					TaskRun {
						run_id: uuid::Uuid::new_v4().to_string(),
						task_id: task_id.clone(),
						status: TaskStatus::Failed,
						started_at: now,
						completed_at: now,
						retry_count: 0,
						error_message: Some(e.to_string()),
					},
				);
				summary.failed.push(task_id);
				continue;
			}

			let task = Arc::clone(&registered.task);
			let token = registered.cancellation_token.clone();
			let retry = self.retry.clone();
			let runs = Arc::clone(&self.runs);

			match registered.schedule {
				TaskSchedule::OneShot => {
					one_shots.push(runtime.spawn(async move {
						if token.is_cancelled() {
							return;
						}
						let _ = run_task_with_retry(&task, &retry, &token, &runs).await;
					}));
				}
				TaskSchedule::Periodic { interval } => {
					let mut shutdown_rx = self.shutdown_tx.subscribe();
					let task_id = task_id.clone();
					periodics.push(runtime.spawn(async move {
						loop {
							tokio::select! {
									_ = tokio::time::sleep(interval) => {
											if token.is_cancelled() {
													break;
											}
											let _ = run_task_with_retry(&task, &retry, &token, &runs).await;
									}
									_ = shutdown_rx.recv() => {
											info!(task_id = %task_id, "Shutting down periodic task");
											break;
									}
							}
						}
					}));
				}
			}
			summary.started.push(task_id);
		}

		state.one_shot_handles.extend(one_shots);
		state.periodic_handles.extend(periodics);

		info!(
			started = summary.started.len(),
			failed = summary.failed.len(),
			"Delayed task scheduler started"
		);
		Ok(summary)
	}

	/// Wait for every one-shot task to finish.
	pub async fn wait(&self) {
		let handles = std::mem::take(&mut self.state().one_shot_handles);
		for result in futures::future::join_all(handles).await {
			if let Err(e) = result {
				warn!(error = %e, "Delayed task panicked");
			}
		}
	}

	/// Stop periodic tasks and cancel anything that has not run yet.
	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let handles = {
			let mut state = self.state();
			for registered in &state.tasks {
				registered.cancellation_token.cancel();
			}
			std::mem::take(&mut state.periodic_handles)
		};

		let _ = self.shutdown_tx.send(());
		for result in futures::future::join_all(handles).await {
			if let Err(e) = result {
				warn!(error = %e, "Periodic task panicked");
			}
		}
		info!("Delayed task scheduler stopped");
	}

	/// Runs completed so far, in completion order.
	pub fn runs(&self) -> Vec<TaskRun> {
		self.runs.lock().map(|r| r.clone()).unwrap_or_default()
	}
}

impl Default for DelayedTaskScheduler {
	fn default() -> Self {
		Self::new()
	}
}

fn push_run(runs: &Mutex<Vec<TaskRun>>, run: TaskRun) {
	if let Ok(mut runs) = runs.lock() {
		runs.push(run);
	}
}

async fn run_task_with_retry(
	task: &Arc<dyn DelayedTask>,
	retry: &RetryPolicy,
	cancellation_token: &CancellationToken,
	runs: &Mutex<Vec<TaskRun>>,
) -> std::result::Result<String, TaskError> {
	let mut retry_count = 0u32;
	let run_id = uuid::Uuid::new_v4().to_string();
	let started_at = Utc::now();

	let finish = |status: TaskStatus, retry_count: u32, error_message: Option<String>| TaskRun {
		run_id: run_id.clone(),
		task_id: task.id().to_string(),
		status,
		started_at,
		completed_at: Utc::now(),
		retry_count,
		error_message,
	};

	loop {
		let ctx = TaskContext {
			run_id: run_id.clone(),
			attempt: retry_count,
			cancellation_token: cancellation_token.clone(),
		};

		match task.run(&ctx).await {
			Ok(()) => {
				push_run(runs, finish(TaskStatus::Succeeded, retry_count, None));
				info!(task_id = %task.id(), run_id = %run_id, "Task completed successfully");
				return Ok(ctx.run_id);
			}
			Err(TaskError::Cancelled) => {
				push_run(runs, finish(TaskStatus::Cancelled, retry_count, None));
				info!(task_id = %task.id(), run_id = %run_id, "Task cancelled");
				return Err(TaskError::Cancelled);
			}
			Err(TaskError::Failed { message, retryable }) => {
				if retryable && retry_count < retry.max_retries && !cancellation_token.is_cancelled() {
					retry_count += 1;
					let delay = retry.delay_for(retry_count);
					warn!(
							task_id = %task.id(),
							run_id = %run_id,
							retry_count,
							delay_ms = delay.as_millis() as u64,
							error = %message,
							"Task failed, retrying"
					);
					tokio::time::sleep(delay).await;
					continue;
				}

				push_run(runs, finish(TaskStatus::Failed, retry_count, Some(message.clone())));
				warn!(task_id = %task.id(), run_id = %run_id, error = %message, "Task failed");
				return Err(TaskError::Failed { message, retryable });
			}
		}
	}
}
