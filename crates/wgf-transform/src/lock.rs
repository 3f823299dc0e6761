// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Advisory `flock` on the state directory, held for the duration of a run.
//!
//! Atomic writes are per call; two runs against one state directory would still
//! interleave their reconciliation. The lock serializes whole runs.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::LockError;

pub const LOCK_FILE_NAME: &str = ".wg-federation.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
	/// Readers such as `check`; coexist with each other.
	Shared,
	/// A full run.
	Exclusive,
}

/// Held lock. Released when dropped.
#[derive(Debug)]
pub struct RunLock {
	file: File,
	path: PathBuf,
	mode: LockMode,
}

impl RunLock {
	/// Take the lock without blocking; a lock held elsewhere is
	/// [`LockError::Held`].
	pub fn try_acquire(state_dir: &Path, mode: LockMode) -> Result<Self, LockError> {
		let path = state_dir.join(LOCK_FILE_NAME);

		std::fs::create_dir_all(state_dir).map_err(|e| LockError::Io {
			path: path.clone(),
			source: e,
		})?;

		let file = OpenOptions::new()
			.create(true)
			.truncate(false)
			.read(true)
			.write(true)
			.open(&path)
			.map_err(|e| LockError::Io {
				path: path.clone(),
				source: e,
			})?;

		let acquired = try_flock(&file, mode).map_err(|e| LockError::Io {
			path: path.clone(),
			source: e,
		})?;
		if !acquired {
			return Err(LockError::Held { path });
		}

		debug!(path = %path.display(), ?mode, "state directory locked");
		Ok(Self { file, path, mode })
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn mode(&self) -> LockMode {
		self.mode
	}
}

impl Drop for RunLock {
	fn drop(&mut self) {
		unlock(&self.file);
		debug!(path = %self.path.display(), "state directory unlocked");
	}
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn try_flock(file: &File, mode: LockMode) -> std::io::Result<bool> {
	use std::os::unix::io::AsRawFd;

	let op = match mode {
		LockMode::Shared => libc::LOCK_SH,
		LockMode::Exclusive => libc::LOCK_EX,
	};
	// SAFETY: the descriptor comes from a live `File` borrowed for the call.
	let rc = unsafe { libc::flock(file.as_raw_fd(), op | libc::LOCK_NB) };
	if rc == 0 {
		return Ok(true);
	}
	let err = std::io::Error::last_os_error();
	if err.kind() == std::io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK) {
		return Ok(false);
	}
	Err(err)
}

#[cfg(not(unix))]
fn try_flock(_file: &File, _mode: LockMode) -> std::io::Result<bool> {
	Ok(true)
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn unlock(file: &File) {
	use std::os::unix::io::AsRawFd;

	// SAFETY: as above; failure only means the lock is released on close.
	unsafe {
		libc::flock(file.as_raw_fd(), libc::LOCK_UN);
	}
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}

#[cfg(all(test, unix))]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[test]
	fn exclusive_lock_excludes_second_holder() {
		let dir = TempDir::new().unwrap();

		let first = RunLock::try_acquire(dir.path(), LockMode::Exclusive).unwrap();
		assert!(first.path().ends_with(LOCK_FILE_NAME));

		let second = RunLock::try_acquire(dir.path(), LockMode::Exclusive);
		assert!(matches!(second, Err(LockError::Held { .. })));

		drop(first);
		assert!(RunLock::try_acquire(dir.path(), LockMode::Exclusive).is_ok());
	}

	#[test]
	fn shared_locks_coexist_but_block_exclusive() {
		let dir = TempDir::new().unwrap();

		let a = RunLock::try_acquire(dir.path(), LockMode::Shared).unwrap();
		let b = RunLock::try_acquire(dir.path(), LockMode::Shared).unwrap();
		assert_eq!(a.mode(), LockMode::Shared);

		assert!(matches!(
			RunLock::try_acquire(dir.path(), LockMode::Exclusive),
			Err(LockError::Held { .. })
		));
		drop((a, b));
	}

	#[test]
	fn creates_missing_state_dir() {
		let dir = TempDir::new().unwrap();
		let state = dir.path().join("state");
		let _lock = RunLock::try_acquire(&state, LockMode::Exclusive).unwrap();
		assert!(state.join(LOCK_FILE_NAME).exists());
	}
}
