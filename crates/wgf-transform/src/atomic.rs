// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Crash-safe file replacement.
//!
//! Data goes to a named temp file in the destination directory, is flushed and
//! fsynced, then renamed over the destination. Any error drops the temp file,
//! so the destination is either the full new content or untouched.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::AtomicWriteError;

/// Prefix of in-flight temp files; stray ones are removed by cleanup.
pub const TEMP_PREFIX: &str = ".wgf-tmp-";

pub fn atomic_write(path: &Path, data: &[u8]) -> Result<(), AtomicWriteError> {
	atomic_write_with(path, |file| file.write_all(data))
}

/// Like [`atomic_write`] with a caller-supplied writer.
pub fn atomic_write_with<F>(path: &Path, write: F) -> Result<(), AtomicWriteError>
where
	F: FnOnce(&mut File) -> std::io::Result<()>,
{
	let parent = path
		.parent()
		.filter(|p| !p.as_os_str().is_empty())
		.ok_or_else(|| AtomicWriteError::NoParent {
			path: path.to_path_buf(),
		})?;

	std::fs::create_dir_all(parent)
		.map_err(|e| AtomicWriteError::io("create parent directory", parent, e))?;

	let mut tmp = tempfile::Builder::new()
		.prefix(TEMP_PREFIX)
		.tempfile_in(parent)
		.map_err(|e| AtomicWriteError::io("create temp file", parent, e))?;

	write(tmp.as_file_mut()).map_err(|e| AtomicWriteError::io("write temp file", path, e))?;

	tmp.as_file_mut()
		.flush()
		.map_err(|e| AtomicWriteError::io("flush temp file", path, e))?;
	tmp.as_file()
		.sync_all()
		.map_err(|e| AtomicWriteError::io("fsync temp file", path, e))?;

	tmp.persist(path)
		.map_err(|e| AtomicWriteError::io("rename temp file", path, e.error))?;

	fsync_directory(parent)
}

/// Async wrapper running [`atomic_write`] on the blocking pool.
pub async fn atomic_write_async(path: PathBuf, data: Vec<u8>) -> Result<(), AtomicWriteError> {
	let join_path = path.clone();
	tokio::task::spawn_blocking(move || atomic_write(&path, &data))
		.await
		.map_err(|e| AtomicWriteError::io("join blocking write", join_path, std::io::Error::other(e)))?
}

#[cfg(unix)]
fn fsync_directory(dir: &Path) -> Result<(), AtomicWriteError> {
	File::open(dir)
		.and_then(|d| d.sync_all())
		.map_err(|e| AtomicWriteError::io("fsync directory", dir, e))
}

#[cfg(not(unix))]
fn fsync_directory(_dir: &Path) -> Result<(), AtomicWriteError> {
	Ok(())
}
