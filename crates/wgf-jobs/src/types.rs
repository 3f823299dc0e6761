// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const BASE_RETRY_DELAY_SECS: u64 = 1;
const MAX_RETRY_DELAY_SECS: u64 = 60;
const RETRY_FACTOR: f64 = 2.0;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSchedule {
	Periodic { interval: Duration },
	OneShot,
}

impl TaskSchedule {
	pub fn as_str(&self) -> &'static str {
		match self {
			TaskSchedule::Periodic { .. } => "periodic",
			TaskSchedule::OneShot => "one_shot",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
	Succeeded,
	Failed,
	Cancelled,
}

/// Outcome of one task execution, retries included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRun {
	pub run_id: String,
	pub task_id: String,
	pub status: TaskStatus,
	pub started_at: DateTime<Utc>,
	pub completed_at: DateTime<Utc>,
	pub retry_count: u32,
	pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartSummary {
	pub started: Vec<String>,
	pub failed: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: MAX_RETRIES,
			base_delay: Duration::from_secs(BASE_RETRY_DELAY_SECS),
			max_delay: Duration::from_secs(MAX_RETRY_DELAY_SECS),
			backoff_factor: RETRY_FACTOR,
			jitter: true,
		}
	}
}

impl RetryPolicy {
	/// Delay before retry number `retry_count` (1-based).
	pub fn delay_for(&self, retry_count: u32) -> Duration {
		let exponent = retry_count.saturating_sub(1) as i32;
		let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
		let capped = delay.min(self.max_delay.as_secs_f64());

		let final_delay = if self.jitter {
			capped * (0.5 + fastrand::f64())
		} else {
			capped
		};

		Duration::from_secs_f64(final_delay)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn no_jitter() -> RetryPolicy {
		RetryPolicy {
			jitter: false,
			..RetryPolicy::default()
		}
	}

	#[test]
	fn backoff_doubles_from_base() {
		let policy = no_jitter();
		assert_eq!(policy.delay_for(1), Duration::from_secs(1));
		assert_eq!(policy.delay_for(2), Duration::from_secs(2));
		assert_eq!(policy.delay_for(3), Duration::from_secs(4));
		assert_eq!(policy.delay_for(4), Duration::from_secs(8));
	}

	#[test]
	fn backoff_is_capped() {
		let policy = no_jitter();
		assert_eq!(policy.delay_for(7), Duration::from_secs(60));
		assert_eq!(policy.delay_for(30), Duration::from_secs(60));
	}

	#[test]
	fn jitter_stays_within_bounds() {
		let policy = RetryPolicy::default();
		for _ in 0..100 {
			let delay = policy.delay_for(2).as_secs_f64();
			assert!((1.0..3.0).contains(&delay), "delay {delay} out of range");
		}
	}
}
