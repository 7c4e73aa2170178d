//! Run lock: one marker file per target directory
//!
//! The marker holds the PID of the owning process. It is removed when the
//! guard is dropped; a killed process leaves it behind for manual removal.

use crate::error::SyncError;
use crate::logging::*;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct RunLock {
	path: PathBuf,
}

impl RunLock {
	pub fn new(path: PathBuf) -> Self {
		RunLock { path }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Whether the marker exists
	pub fn is_locked(&self) -> bool {
		self.path.symlink_metadata().is_ok()
	}

	/// Create the marker exclusively
	///
	/// Losing a creation race is reported as `LockHeld`.
	pub fn lock(&self) -> Result<RunLockGuard, SyncError> {
		let mut file = OpenOptions::new().write(true).create_new(true).open(&self.path).map_err(
			|e| match e.kind() {
				io::ErrorKind::AlreadyExists => SyncError::LockHeld { path: self.path.clone() },
				_ => SyncError::LockFailed { path: self.path.clone(), source: e },
			},
		)?;

		let guard = RunLockGuard { lock: self.clone() };
		file.write_all(std::process::id().to_string().as_bytes())
			.map_err(|e| SyncError::LockFailed { path: self.path.clone(), source: e })?;

		debug!("Acquired run lock {}", self.path.display());
		Ok(guard)
	}

	/// Remove the marker; an absent marker is fine
	pub fn unlock(&self) -> Result<(), SyncError> {
		match std::fs::remove_file(&self.path) {
			Ok(()) => {
				debug!("Released run lock {}", self.path.display());
				Ok(())
			}
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(SyncError::LockFailed { path: self.path.clone(), source: e }),
		}
	}
}

/// RAII guard releasing the run lock on every exit path
#[derive(Debug)]
pub struct RunLockGuard {
	lock: RunLock,
}

impl Drop for RunLockGuard {
	fn drop(&mut self) {
		if let Err(e) = self.lock.unlock() {
			warn!("{}", e);
		}
	}
}


// vim: ts=4
