// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Handing reconciled interfaces to the external WireGuard apply command.
//!
//! The subscriber only registers work; nothing touches the host until the
//! scheduler starts after the last phase.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use wgf_common_config::{SecretRetrievalMethod, UserInput};
use wgf_jobs::{DelayedTask, DelayedTaskScheduler, TaskContext, TaskError};
use wgf_state::{Event, EventKind, EventSubscriber, PrivateKeyRef, SubscriberError};
use wgf_transform::StateLocation;

use crate::state::RunState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyAction {
	Create,
	Update,
	Delete,
}

impl ApplyAction {
	pub fn from_event(kind: EventKind) -> Option<Self> {
		match kind {
			EventKind::Created => Some(ApplyAction::Create),
			EventKind::Updated => Some(ApplyAction::Update),
			EventKind::Deleted => Some(ApplyAction::Delete),
			_ => None,
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			ApplyAction::Create => "create",
			ApplyAction::Update => "update",
			ApplyAction::Delete => "delete",
		}
	}
}

/// Registers one apply task per interface on CREATED, UPDATED and DELETED,
/// which only fire once the state file on disk matches the transition.
pub struct WireguardApplySubscriber {
	scheduler: Arc<DelayedTaskScheduler>,
	location: StateLocation,
	command: Option<String>,
	method: SecretRetrievalMethod,
	root_passphrase_command: Option<String>,
}

impl WireguardApplySubscriber {
	pub const EVENTS: [EventKind; 3] = [EventKind::Created, EventKind::Updated, EventKind::Deleted];

	pub fn new(input: &UserInput, location: StateLocation, scheduler: Arc<DelayedTaskScheduler>) -> Self {
		Self {
			scheduler,
			location,
			command: input.apply_command.clone(),
			method: input.private_key_retrieval_method,
			root_passphrase_command: input.root_passphrase_command.clone(),
		}
	}

	/// Subscribe a subscriber built from `input` to the run's dispatcher.
	pub fn install(input: &UserInput, state: &mut RunState) {
		let subscriber = Self::new(input, state.location.clone(), Arc::clone(&state.scheduler));
		state.dispatcher.subscribe_all(&Self::EVENTS, Arc::new(subscriber));
	}
}

impl EventSubscriber for WireguardApplySubscriber {
	fn name(&self) -> &str {
		"wireguard-apply"
	}

	fn handle(&self, event: &Event) -> Result<(), SubscriberError> {
		let Some(action) = ApplyAction::from_event(event.kind()) else {
			return Ok(());
		};

		let interface = event.interface().to_string();
		let id = ApplyTask::id_for(&interface);
		if self.scheduler.contains(&id) {
			debug!(interface = %interface, "apply task already registered");
			return Ok(());
		}

		let config = event.configuration();
		let task = ApplyTask {
			id,
			path: self.location.config_path(&interface),
			interface,
			action,
			private_key: config.private_key.clone(),
			command: self.command.clone(),
			method: self.method,
			root_passphrase_command: self.root_passphrase_command.clone(),
		};

		self.scheduler
			.register_one_shot(Arc::new(task))
			.map_err(|e| SubscriberError::new(e.to_string()))
	}
}

/// Runs the apply command for one interface.
pub struct ApplyTask {
	id: String,
	interface: String,
	action: ApplyAction,
	path: PathBuf,
	private_key: Option<PrivateKeyRef>,
	command: Option<String>,
	method: SecretRetrievalMethod,
	root_passphrase_command: Option<String>,
}

impl ApplyTask {
	pub fn id_for(interface: &str) -> String {
		format!("wireguard-apply-{interface}")
	}

	pub fn interface(&self) -> &str {
		&self.interface
	}

	pub fn action(&self) -> ApplyAction {
		self.action
	}

	/// Substitute `{interface}`, `{path}` and `{action}` in the template.
	pub fn render(&self, template: &str) -> String {
		template
			.replace("{interface}", &self.interface)
			.replace("{path}", &self.path.display().to_string())
			.replace("{action}", self.action.as_str())
	}
}

#[async_trait]
impl DelayedTask for ApplyTask {
	fn id(&self) -> &str {
		&self.id
	}

	fn name(&self) -> &str {
		"WireGuard apply"
	}

	fn ready(&self) -> Result<(), TaskError> {
		match &self.command {
			Some(command) if command.trim().is_empty() => Err(TaskError::fatal("apply command is empty")),
			_ => Ok(()),
		}
	}

	#[instrument(skip_all, fields(interface = %self.interface, action = self.action.as_str()))]
	async fn run(&self, ctx: &TaskContext) -> Result<(), TaskError> {
		let Some(template) = &self.command else {
			info!(path = %self.path.display(), "no apply command configured, skipping");
			return Ok(());
		};
		if ctx.cancellation_token.is_cancelled() {
			return Err(TaskError::Cancelled);
		}

		let command = self.render(template);
		let mut process = tokio::process::Command::new("sh");
		process
			.arg("-c")
			.arg(&command)
			.env("WGF_INTERFACE", &self.interface)
			.env("WGF_STATE_PATH", &self.path)
			.env("WGF_ACTION", self.action.as_str());

		if self.action != ApplyAction::Delete {
			if let Some(private_key) = &self.private_key {
				let key = private_key
					.resolve()
					.await
					.map_err(|e| TaskError::fatal(format!("resolving private key: {e}")))?;
				process.env("WGF_PRIVATE_KEY", key.to_base64().expose());
			}
		}

		if self.method == SecretRetrievalMethod::WgFederationCommand {
			if let Some(passphrase_command) = &self.root_passphrase_command {
				process.env("WGF_ROOT_PASSPHRASE_COMMAND", passphrase_command);
			}
		}

		let status = process
			.status()
			.await
			.map_err(|e| TaskError::retryable(format!("spawning apply command: {e}")))?;

		if !status.success() {
			return Err(TaskError::fatal(format!("apply command exited with {status}")));
		}

		info!(attempt = ctx.attempt, "interface applied");
		Ok(())
	}
}
