//! Sync state persistence and dirty tracking

use crate::error::StateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Opaque identifier of a point in source history
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionMarker(String);

impl RevisionMarker {
	pub fn new(marker: impl Into<String>) -> Self {
		RevisionMarker(marker.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for RevisionMarker {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Record of the last fully applied revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
	pub last_revision: RevisionMarker,
	#[serde(default)]
	pub dirty: bool,
}

impl SyncState {
	/// State committed after a successful run
	pub fn clean(last_revision: RevisionMarker) -> Self {
		SyncState { last_revision, dirty: false }
	}
}

/// Reads and writes the state file under the target directory
#[derive(Debug, Clone)]
pub struct StateStore {
	path: PathBuf,
}

impl StateStore {
	pub fn new(path: PathBuf) -> Self {
		StateStore { path }
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Load the persisted state, `None` before the first successful run
	pub async fn read(&self) -> Result<Option<SyncState>, StateError> {
		let contents = match tokio::fs::read_to_string(&self.path).await {
			Ok(c) => c,
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
			Err(e) => return Err(StateError::LoadFailed { path: self.path.clone(), source: e }),
		};

		serde_json::from_str(&contents).map(Some).map_err(|e| StateError::Corrupted {
			path: self.path.clone(),
			message: format!("Failed to parse state JSON: {}", e),
		})
	}

	/// Persist the state atomically (temporary file + rename)
	pub async fn write(&self, state: &SyncState) -> Result<(), StateError> {
		let path = self.path.clone();
		let json = serde_json::to_vec(state)
			.map_err(|e| StateError::SaveFailed { path: path.clone(), source: Box::new(e) })?;

		let result = tokio::task::spawn_blocking(move || write_atomic(&path, &json)).await;
		match result {
			Ok(res) => res,
			Err(e) => Err(StateError::SaveFailed { path: self.path.clone(), source: Box::new(e) }),
		}
	}
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StateError> {
	let save_failed =
		|e: io::Error| StateError::SaveFailed { path: path.to_path_buf(), source: Box::new(e) };
	let dir = match path.parent() {
		Some(p) if !p.as_os_str().is_empty() => p,
		_ => Path::new("."),
	};

	let mut tmp =
		tempfile::Builder::new().prefix(".beamsync-state-").tempfile_in(dir).map_err(save_failed)?;
	tmp.write_all(contents).map_err(save_failed)?;
	tmp.as_file().sync_all().map_err(save_failed)?;
	tmp.persist(path).map_err(|e| save_failed(e.error))?;
	Ok(())
}

/// In-memory dirty flag shared between the adapter and the workflow
#[derive(Debug, Clone, Default)]
pub struct DirtyFlag(Arc<AtomicBool>);

impl DirtyFlag {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set_dirty(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn set_clean(&self) {
		self.0.store(false, Ordering::SeqCst);
	}

	pub fn is_dirty(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// Whether the persisted record calls for a workflow run
pub fn needs_workflow(previous: Option<&SyncState>, current: &RevisionMarker) -> bool {
	match previous {
		Some(state) => state.dirty || &state.last_revision != current,
		None => true,
	}
}


// vim: ts=4
