//! Error types for beamsync operations

use std::error::Error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Main error type for sync runs
#[derive(Debug)]
pub enum SyncError {
	/// Invalid configuration (unknown adapter/comparator, bad duration, ...)
	InvalidConfig { message: String },

	/// I/O error on a known path
	Io { path: PathBuf, source: io::Error },

	/// A path expected to be a file turned out to be a directory
	IsDirectory { path: PathBuf },

	/// Reconciling one file failed
	Reconcile { source: PathBuf, target: PathBuf, cause: Box<SyncError> },

	/// Rendering a template failed
	Template { path: PathBuf, message: String },

	/// Two source files map onto the same target path
	TargetCollision { target: PathBuf, first: PathBuf, second: PathBuf },

	/// Another run holds the run lock
	LockHeld { path: PathBuf },

	/// Lock acquisition or release failed
	LockFailed { path: PathBuf, source: io::Error },

	/// A worker task panicked or was cancelled
	TaskFailed { message: String },

	/// Exclusion error (nested)
	Exclusion(ExclusionError),

	/// State error (nested)
	State(StateError),

	/// Adapter error (nested)
	Adapter(AdapterError),
}

impl SyncError {
	/// Wrap an I/O error with the path it happened on
	pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
		SyncError::Io { path: path.as_ref().to_path_buf(), source }
	}

	pub fn config(message: impl Into<String>) -> Self {
		SyncError::InvalidConfig { message: message.into() }
	}
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::InvalidConfig { message } => {
				write!(f, "Invalid configuration: {}", message)
			}
			SyncError::Io { path, source } => {
				write!(f, "I/O error on {}: {}", path.display(), source)
			}
			SyncError::IsDirectory { path } => {
				write!(f, "Expected a file but found a directory: {}", path.display())
			}
			SyncError::Reconcile { source, target, cause } => {
				write!(f, "Failed to reconcile {} -> {}: {}", source.display(), target.display(), cause)
			}
			SyncError::Template { path, message } => {
				write!(f, "Failed to render template {}: {}", path.display(), message)
			}
			SyncError::TargetCollision { target, first, second } => write!(
				f,
				"Both {} and {} would be written to {}",
				first.display(),
				second.display(),
				target.display()
			),
			SyncError::LockHeld { path } => {
				write!(f, "Run lock is held: {}", path.display())
			}
			SyncError::LockFailed { path, source } => {
				write!(f, "Lock operation failed on {}: {}", path.display(), source)
			}
			SyncError::TaskFailed { message } => write!(f, "Worker task failed: {}", message),
			SyncError::Exclusion(e) => write!(f, "Exclusion error: {}", e),
			SyncError::State(e) => write!(f, "State error: {}", e),
			SyncError::Adapter(e) => write!(f, "Adapter error: {}", e),
		}
	}
}

impl Error for SyncError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			SyncError::Io { source, .. } => Some(source),
			SyncError::LockFailed { source, .. } => Some(source),
			SyncError::Reconcile { cause, .. } => Some(cause.as_ref()),
			SyncError::Exclusion(e) => Some(e),
			SyncError::State(e) => Some(e),
			SyncError::Adapter(e) => Some(e),
			_ => None,
		}
	}
}

impl From<ExclusionError> for SyncError {
	fn from(e: ExclusionError) -> Self {
		SyncError::Exclusion(e)
	}
}

impl From<StateError> for SyncError {
	fn from(e: StateError) -> Self {
		SyncError::State(e)
	}
}

impl From<AdapterError> for SyncError {
	fn from(e: AdapterError) -> Self {
		SyncError::Adapter(e)
	}
}

/// Errors that can occur while building the ignore set
#[derive(Debug)]
pub enum ExclusionError {
	/// Failed to parse a glob pattern
	InvalidPattern(String),

	/// Failed to read the ignore file
	IgnoreFileError(String),
}

impl fmt::Display for ExclusionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ExclusionError::InvalidPattern(msg) => write!(f, "Invalid ignore pattern: {}", msg),
			ExclusionError::IgnoreFileError(msg) => write!(f, "Ignore file error: {}", msg),
		}
	}
}

impl Error for ExclusionError {}

/// State management errors
#[derive(Debug)]
pub enum StateError {
	/// Failed to load state
	LoadFailed { path: PathBuf, source: io::Error },

	/// Failed to save state
	SaveFailed { path: PathBuf, source: Box<dyn Error + Send + Sync> },

	/// State file is corrupted
	Corrupted { path: PathBuf, message: String },
}

impl fmt::Display for StateError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StateError::LoadFailed { path, source } => {
				write!(f, "Failed to load state {}: {}", path.display(), source)
			}
			StateError::SaveFailed { path, source } => {
				write!(f, "Failed to save state {}: {}", path.display(), source)
			}
			StateError::Corrupted { path, message } => {
				write!(f, "State file {} is corrupted: {}", path.display(), message)
			}
		}
	}
}

impl Error for StateError {}

/// Errors raised by source adapters
#[derive(Debug)]
pub enum AdapterError {
	/// Cloning or opening the working copy failed
	InitFailed { message: String },

	/// The working copy points at a different upstream
	RemoteMismatch { expected: String, actual: String },

	/// Fetching or fast-forwarding failed
	SyncFailed { message: String },

	/// Local history cannot fast-forward to upstream
	CannotFastForward { message: String },

	/// A revision marker could not be resolved
	RevisionNotFound { marker: String, message: String },

	/// Authentication setup failed
	AuthFailed { message: String },

	/// Operation called before init()
	NotInitialized,
}

impl fmt::Display for AdapterError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			AdapterError::InitFailed { message } => write!(f, "Init failed: {}", message),
			AdapterError::RemoteMismatch { expected, actual } => write!(
				f,
				"Remote repository URL does not match the configured one: {} -> {}",
				actual, expected
			),
			AdapterError::SyncFailed { message } => write!(f, "Sync failed: {}", message),
			AdapterError::CannotFastForward { message } => {
				write!(f, "Cannot fast-forward: {}", message)
			}
			AdapterError::RevisionNotFound { marker, message } => {
				write!(f, "Revision {} not found: {}", marker, message)
			}
			AdapterError::AuthFailed { message } => {
				write!(f, "Authentication setup failed: {}", message)
			}
			AdapterError::NotInitialized => write!(f, "Adapter used before init"),
		}
	}
}

impl Error for AdapterError {}

impl From<git2::Error> for AdapterError {
	fn from(e: git2::Error) -> Self {
		AdapterError::SyncFailed { message: e.message().to_string() }
	}
}


// vim: ts=4
