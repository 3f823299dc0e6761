// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// No registered loader accepts the source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no loader supports source {identity}")]
pub struct UnsupportedSourceError {
	pub identity: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
	#[error("failed to read {identity}: {source}")]
	Io {
		identity: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse {identity}: {message}")]
	Parse { identity: String, message: String },

	#[error("failed to fetch {identity}: {source}")]
	Http {
		identity: String,
		#[source]
		source: reqwest::Error,
	},

	#[error("{identity} does not contain a mapping at its top level")]
	NotAMapping { identity: String },

	#[error("loading {identity} timed out after {timeout:?}")]
	Timeout { identity: String, timeout: Duration },

	#[error("digest file for {identity} is missing")]
	DigestMissing { identity: String },

	#[error("digest mismatch for {identity}: expected {expected}, found {actual}")]
	DigestMismatch {
		identity: String,
		expected: String,
		actual: String,
	},

	#[error("failed to decrypt {identity}: {message}")]
	Decrypt { identity: String, message: String },

	#[error(transparent)]
	Unsupported(#[from] UnsupportedSourceError),
}

impl LoadError {
	pub fn parse(identity: impl Into<String>, message: impl ToString) -> Self {
		Self::Parse {
			identity: identity.into(),
			message: message.to_string(),
		}
	}

	/// Identity of the source the error belongs to.
	pub fn identity(&self) -> &str {
		match self {
			LoadError::Io { identity, .. }
			| LoadError::Parse { identity, .. }
			| LoadError::Http { identity, .. }
			| LoadError::NotAMapping { identity }
			| LoadError::Timeout { identity, .. }
			| LoadError::DigestMissing { identity }
			| LoadError::DigestMismatch { identity, .. }
			| LoadError::Decrypt { identity, .. } => identity,
			LoadError::Unsupported(e) => &e.identity,
		}
	}

	pub fn is_unsupported(&self) -> bool {
		matches!(self, LoadError::Unsupported(_))
	}
}

#[derive(Debug, Error)]
pub enum AtomicWriteError {
	#[error("{path} has no parent directory")]
	NoParent { path: PathBuf },

	#[error("{op} failed for {path}: {source}")]
	Io {
		op: &'static str,
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},
}

impl AtomicWriteError {
	pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
		Self::Io {
			op,
			path: path.into(),
			source,
		}
	}
}

#[derive(Debug, Error)]
pub enum SaveError {
	#[error("no saver supports destination {identity}")]
	Unsupported { identity: String },

	#[error("failed to serialize for {identity}: {message}")]
	Serialize { identity: String, message: String },

	#[error("failed to write {identity}: {source}")]
	Write {
		identity: String,
		#[source]
		source: AtomicWriteError,
	},

	#[error("failed to remove {identity}: {source}")]
	Remove {
		identity: String,
		#[source]
		source: std::io::Error,
	},

	#[error("saving {identity} timed out after {timeout:?}")]
	Timeout { identity: String, timeout: Duration },

	#[error("failed to write digest for {identity}: {message}")]
	Digest { identity: String, message: String },

	#[error("failed to encrypt {identity}: {message}")]
	Encrypt { identity: String, message: String },

	#[error("save task for {identity} did not complete: {message}")]
	Task { identity: String, message: String },
}

impl SaveError {
	pub fn serialize(identity: impl Into<String>, message: impl ToString) -> Self {
		Self::Serialize {
			identity: identity.into(),
			message: message.to_string(),
		}
	}

	pub fn identity(&self) -> &str {
		match self {
			SaveError::Unsupported { identity }
			| SaveError::Serialize { identity, .. }
			| SaveError::Write { identity, .. }
			| SaveError::Remove { identity, .. }
			| SaveError::Timeout { identity, .. }
			| SaveError::Digest { identity, .. }
			| SaveError::Encrypt { identity, .. }
			| SaveError::Task { identity, .. } => identity,
		}
	}
}

#[derive(Debug, Error)]
pub enum LockError {
	#[error("failed to open lock file {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("state directory is locked by another run ({path})")]
	Held { path: PathBuf },
}
