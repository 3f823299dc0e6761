// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! What happened during a run: transitions applied, item failures, conflicts.

use std::fmt;

use tracing::{info, warn};
use wgf_state::{EventKind, SourceConflict};

use crate::phase::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
	Load,
	Validation,
	Handler,
	Save,
	Remove,
	Digest,
	Cleanup,
	Schedule,
	Controller,
}

impl ReportKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			ReportKind::Load => "load",
			ReportKind::Validation => "validation",
			ReportKind::Handler => "handler",
			ReportKind::Save => "save",
			ReportKind::Remove => "remove",
			ReportKind::Digest => "digest",
			ReportKind::Cleanup => "cleanup",
			ReportKind::Schedule => "schedule",
			ReportKind::Controller => "controller",
		}
	}
}

impl fmt::Display for ReportKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// One captured, non-fatal error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
	pub phase: Phase,
	/// Interface, source or destination the error belongs to.
	pub identity: String,
	pub kind: ReportKind,
	pub message: String,
}

pub type ConflictWarning = SourceConflict;

/// A lifecycle transition that was applied to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransition {
	pub interface: String,
	pub kind: EventKind,
	pub revision: u64,
}

#[derive(Debug, Default)]
pub struct RunReport {
	entries: Vec<ReportEntry>,
	conflicts: Vec<ConflictWarning>,
	transitions: Vec<AppliedTransition>,
}

impl RunReport {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn record(&mut self, phase: Phase, identity: impl Into<String>, kind: ReportKind, message: impl ToString) {
		let entry = ReportEntry {
			phase,
			identity: identity.into(),
			kind,
			message: message.to_string(),
		};
		warn!(
			phase = %entry.phase,
			identity = %entry.identity,
			kind = %entry.kind,
			error = %entry.message,
			"item failed"
		);
		self.entries.push(entry);
	}

	pub fn conflict(&mut self, conflict: ConflictWarning) {
		warn!(
			interface = %conflict.interface,
			kept = %conflict.kept,
			ignored = %conflict.ignored,
			"conflicting sources for interface, first registered wins"
		);
		self.conflicts.push(conflict);
	}

	pub fn transition(&mut self, interface: &str, kind: EventKind, revision: u64) {
		info!(interface, kind = %kind, revision, "transition applied");
		self.transitions.push(AppliedTransition {
			interface: interface.to_string(),
			kind,
			revision,
		});
	}

	pub fn entries(&self) -> &[ReportEntry] {
		&self.entries
	}

	pub fn entries_of(&self, kind: ReportKind) -> impl Iterator<Item = &ReportEntry> {
		self.entries.iter().filter(move |e| e.kind == kind)
	}

	pub fn conflicts(&self) -> &[ConflictWarning] {
		&self.conflicts
	}

	pub fn transitions(&self) -> &[AppliedTransition] {
		&self.transitions
	}

	/// No item failed and no conflict was seen.
	pub fn is_clean(&self) -> bool {
		self.entries.is_empty() && self.conflicts.is_empty()
	}
}
