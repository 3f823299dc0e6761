// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! BASELINE controllers. Any error here aborts the run before anything is
//! mutated.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, instrument};
use wgf_common_config::UserInput;
use wgf_common_secret::SecretString;
use wgf_transform::{
	classify_destination, ConfigurationSource, DestinationKind, LockMode, RunLock, StateCipher,
};

use crate::controller::Controller;
use crate::error::ControllerError;
use crate::state::RunState;

pub struct ValidateInput;

#[async_trait]
impl Controller for ValidateInput {
	fn name(&self) -> &'static str {
		"validate-input"
	}

	async fn execute(&self, input: &UserInput, _state: &mut RunState) -> Result<(), ControllerError> {
		input.validate()?;
		Ok(())
	}
}

/// Runs the root passphrase command, when one is configured, and switches the
/// state registries to sealed state.
pub struct ResolveRootPassphrase;

#[async_trait]
impl Controller for ResolveRootPassphrase {
	fn name(&self) -> &'static str {
		"resolve-root-passphrase"
	}

	#[instrument(skip_all)]
	async fn execute(&self, input: &UserInput, state: &mut RunState) -> Result<(), ControllerError> {
		let Some(command) = &input.root_passphrase_command else {
			debug!("no root passphrase command, state stays unencrypted");
			return Ok(());
		};

		let passphrase = run_passphrase_command(command, input.io_timeout).await?;
		state.enable_encryption(input, &StateCipher::new(passphrase));
		info!("state encryption enabled");
		Ok(())
	}
}

async fn run_passphrase_command(
	command: &str,
	timeout: std::time::Duration,
) -> Result<SecretString, ControllerError> {
	let output = tokio::process::Command::new("sh")
		.arg("-c")
		.arg(command)
		.stdin(std::process::Stdio::null())
		.stderr(std::process::Stdio::inherit())
		.output();

	let output = tokio::time::timeout(timeout, output)
		.await
		.map_err(|_| ControllerError::Passphrase(format!("timed out after {timeout:?}")))?
		.map_err(|e| ControllerError::Passphrase(format!("spawning: {e}")))?;

	if !output.status.success() {
		return Err(ControllerError::Passphrase(format!("exited with {}", output.status)));
	}

	let stdout = SecretString::new(
		String::from_utf8(output.stdout)
			.map_err(|_| ControllerError::Passphrase("output is not UTF-8".to_string()))?,
	);
	let passphrase = stdout.expose().trim();
	if passphrase.is_empty() {
		return Err(ControllerError::Passphrase("printed an empty passphrase".to_string()));
	}
	Ok(SecretString::new(passphrase.to_string()))
}

/// Takes the state directory lock for the rest of the run.
pub struct AcquireRunLock {
	mode: LockMode,
}

impl AcquireRunLock {
	pub fn new(mode: LockMode) -> Self {
		Self { mode }
	}
}

#[async_trait]
impl Controller for AcquireRunLock {
	fn name(&self) -> &'static str {
		"acquire-run-lock"
	}

	async fn execute(&self, input: &UserInput, state: &mut RunState) -> Result<(), ControllerError> {
		let lock = RunLock::try_acquire(&input.state_dir, self.mode)?;
		info!(path = %lock.path().display(), mode = ?self.mode, "run lock acquired");
		state.lock = Some(lock);
		Ok(())
	}
}

/// Collects sources: structured files found in each source directory (sorted
/// by name), then explicitly declared sources. Duplicates keep their first
/// position.
pub struct SourceDiscovery;

#[async_trait]
impl Controller for SourceDiscovery {
	fn name(&self) -> &'static str {
		"source-discovery"
	}

	#[instrument(skip_all)]
	async fn execute(&self, input: &UserInput, state: &mut RunState) -> Result<(), ControllerError> {
		let mut seen = BTreeSet::new();
		let mut sources = Vec::new();

		for dir in &input.source_dirs {
			for path in scan_source_dir(dir)? {
				let source = ConfigurationSource::File(path);
				if seen.insert(source.identity()) {
					sources.push(source);
				}
			}
		}

		for raw in &input.sources {
			let source = ConfigurationSource::parse(raw);
			if let ConfigurationSource::Environment { prefix } = &source {
				if prefix.is_empty() {
					return Err(ControllerError::Input(wgf_common_config::ConfigError::invalid_value(
						"sources",
						"environment source needs a prefix (env:PREFIX)",
					)));
				}
			}
			if seen.insert(source.identity()) {
				sources.push(source);
			}
		}

		info!(count = sources.len(), "sources discovered");
		state.sources = sources;
		Ok(())
	}
}

fn scan_source_dir(dir: &Path) -> Result<Vec<PathBuf>, ControllerError> {
	if !dir.is_dir() {
		return Err(ControllerError::SourceDir {
			path: dir.to_path_buf(),
			message: "does not exist or is not a directory".to_string(),
		});
	}

	let read_dir = std::fs::read_dir(dir)
		.map_err(|e| ControllerError::io(format!("reading source directory {}", dir.display()), e))?;

	let mut files = Vec::new();
	for entry in read_dir {
		let entry =
			entry.map_err(|e| ControllerError::io(format!("reading source directory {}", dir.display()), e))?;
		let path = entry.path();
		let hidden = path
			.file_name()
			.and_then(|n| n.to_str())
			.is_some_and(|n| n.starts_with('.'));
		if hidden || !path.is_file() {
			continue;
		}
		match classify_destination(&path) {
			DestinationKind::Json | DestinationKind::Toml | DestinationKind::Yaml => files.push(path),
			kind => debug!(path = %path.display(), ?kind, "ignoring non-source file"),
		}
	}

	files.sort();
	Ok(files)
}
