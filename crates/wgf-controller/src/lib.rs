// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The phased controller loop.
//!
//! A run is BASELINE (validate input, lock the state directory, discover
//! sources), MAIN (reload prior state, reconcile, persist) and LATE (verify
//! digests, clean up, schedule audits). Delayed tasks registered along the way
//! start only after LATE.

pub mod apply;
pub mod audit;
pub mod baseline;
pub mod controller;
pub mod error;
pub mod late;
pub mod orchestrator;
pub mod phase;
pub mod reconcile;
pub mod report;
pub mod state;

pub use apply::{ApplyAction, ApplyTask, WireguardApplySubscriber};
pub use audit::DigestAuditTask;
pub use controller::Controller;
pub use error::{BaselineValidationError, ControllerError};
pub use orchestrator::ControllerPhaseOrchestrator;
pub use phase::Phase;
pub use report::{AppliedTransition, ConflictWarning, ReportEntry, ReportKind, RunReport};
pub use state::RunState;
