// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layout of the state directory.

use std::path::{Path, PathBuf};

use wgf_common_config::StateFormat;

use crate::atomic::TEMP_PREFIX;
use crate::lock::LOCK_FILE_NAME;
use crate::saver::{classify_destination, digest_path, DestinationKind, DIGEST_SUFFIX};

/// `<state_dir>/<interface>.<ext>` plus its `.digest` sibling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLocation {
	dir: PathBuf,
	format: StateFormat,
}

impl StateLocation {
	pub fn new(dir: impl Into<PathBuf>, format: StateFormat) -> Self {
		Self {
			dir: dir.into(),
			format,
		}
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}

	pub fn format(&self) -> StateFormat {
		self.format
	}

	pub fn config_path(&self, interface: &str) -> PathBuf {
		self.dir.join(format!("{interface}.{}", self.format.extension()))
	}

	pub fn digest_path(&self, interface: &str) -> PathBuf {
		digest_path(&self.config_path(interface))
	}

	pub fn lock_path(&self) -> PathBuf {
		self.dir.join(LOCK_FILE_NAME)
	}

	/// Persisted state files in any format, sorted by path. A missing
	/// directory has no state.
	pub fn persisted(&self) -> std::io::Result<Vec<PathBuf>> {
		let mut files: Vec<PathBuf> = self
			.entries()?
			.into_iter()
			.filter(|p| {
				matches!(
					classify_destination(p),
					DestinationKind::Json | DestinationKind::Toml | DestinationKind::Yaml
				)
			})
			.collect();
		files.sort();
		Ok(files)
	}

	/// Leftover temp files and `.digest` files whose state file is gone.
	/// Other digest-style files were not written here and are left alone.
	pub fn strays(&self) -> std::io::Result<Vec<PathBuf>> {
		let mut strays: Vec<PathBuf> = self
			.entries()?
			.into_iter()
			.filter(|p| {
				let Some(name) = p.file_name().and_then(|n| n.to_str()) else {
					return false;
				};
				if name.starts_with(TEMP_PREFIX) {
					return true;
				}
				match name.strip_suffix(DIGEST_SUFFIX) {
					Some(base) if !base.is_empty() => !p.with_file_name(base).is_file(),
					_ => false,
				}
			})
			.collect();
		strays.sort();
		Ok(strays)
	}

	fn entries(&self) -> std::io::Result<Vec<PathBuf>> {
		let read_dir = match std::fs::read_dir(&self.dir) {
			Ok(rd) => rd,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(e),
		};

		let mut out = Vec::new();
		for entry in read_dir {
			let entry = entry?;
			if entry.file_type()?.is_file() {
				out.push(entry.path());
			}
		}
		Ok(out)
	}
}
