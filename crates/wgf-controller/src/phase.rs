// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::fmt;

/// Controller phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
	/// Validate input, discover sources, take the run lock. Failures abort the run.
	Baseline,
	/// Load, reconcile and persist. Failures are recorded per interface.
	Main,
	/// Verification and cleanup. Failures are reported only.
	Late,
}

impl Phase {
	pub const ALL: [Phase; 3] = [Phase::Baseline, Phase::Main, Phase::Late];

	pub fn as_str(&self) -> &'static str {
		match self {
			Phase::Baseline => "BASELINE",
			Phase::Main => "MAIN",
			Phase::Late => "LATE",
		}
	}
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}
