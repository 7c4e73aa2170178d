//! Source adapters
//!
//! An adapter owns the working copy the source tree is read from. It knows
//! how to create it, how to advance it to the latest upstream revision, and
//! which paths disappeared between two revisions. Finalization (deletions
//! followed by the state commit) is shared by every adapter.

pub mod git;

pub use self::git::GitAdapter;

use crate::config::Config;
use crate::delete::{DeletionReport, DeletionResolver};
use crate::error::SyncError;
use crate::exclusion::IgnoreMatcher;
use crate::logging::*;
use crate::paths::SyncPaths;
use crate::state::{DirtyFlag, RevisionMarker, StateStore, SyncState};
use crate::strategies::AdapterKind;
use crate::template::TemplateExtensions;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Result of advancing the working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
	/// The working copy moved to a new revision
	pub changed: bool,
	pub marker: RevisionMarker,
}

/// Everything finalization needs from the current run
pub struct FinalizeStage<'a> {
	pub paths: &'a SyncPaths,
	pub matcher: &'a IgnoreMatcher,
	pub templates: &'a TemplateExtensions,
	/// Target paths reconciled by this run
	pub reconciled: &'a BTreeSet<PathBuf>,
	pub state: &'a StateStore,
	pub dirty: &'a DirtyFlag,
	pub sync_delete: bool,
	pub delete_empty_dirs: bool,
	pub force_sync: bool,
}

impl FinalizeStage<'_> {
	/// Whether deletions run for this finalization
	pub fn deletes(&self, previous: Option<&RevisionMarker>) -> bool {
		previous.is_some() && self.sync_delete && (self.force_sync || self.dirty.is_dirty())
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
	/// `None` when deletion was skipped
	pub deletion: Option<DeletionReport>,
	pub committed: RevisionMarker,
}

#[async_trait]
pub trait Adapter: Send + Sync {
	fn name(&self) -> &'static str;

	/// Ignore patterns covering the adapter's private metadata
	fn metadata_patterns(&self) -> Vec<String>;

	/// Create or open the working copy; returns its current revision
	async fn init(&mut self) -> Result<RevisionMarker, SyncError>;

	/// Advance the working copy to the latest upstream revision
	async fn sync(&mut self) -> Result<SyncOutcome, SyncError>;

	/// Working-copy-relative paths present at `previous` and gone at `current`
	async fn removed_paths(
		&self,
		previous: &RevisionMarker,
		current: &RevisionMarker,
	) -> Result<Vec<PathBuf>, SyncError>;

	/// Apply upstream deletions, then commit `current` as the applied revision
	async fn finalize(
		&self,
		stage: &FinalizeStage<'_>,
		previous: Option<&RevisionMarker>,
		current: &RevisionMarker,
	) -> Result<FinalizeReport, SyncError> {
		let deletion = match previous {
			Some(prev) if stage.deletes(previous) => {
				debug!("Syncing deleted files: from {} to {}", prev, current);
				let removed = if prev == current {
					Vec::new()
				} else {
					self.removed_paths(prev, current).await?
				};

				if removed.is_empty() {
					info!("No deleted files between {} and {}", prev, current);
				}
				let resolver = DeletionResolver::new(
					stage.paths,
					stage.matcher,
					stage.templates,
					stage.reconciled,
					stage.delete_empty_dirs,
				);
				Some(resolver.remove(&removed)?)
			}
			_ => None,
		};

		stage.state.write(&SyncState::clean(current.clone())).await?;
		stage.dirty.set_clean();
		debug!("Committed state {}", current);

		Ok(FinalizeReport { deletion, committed: current.clone() })
	}
}

/// Build the adapter selected by configuration
pub fn create_adapter(config: &Config, dirty: DirtyFlag) -> Result<Box<dyn Adapter>, SyncError> {
	match config.adapter {
		AdapterKind::Git => Ok(Box::new(GitAdapter::new(
			config.git.clone(),
			config.working_directory.clone(),
			dirty,
		))),
	}
}

// vim: ts=4
