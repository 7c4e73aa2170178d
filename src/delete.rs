//! Deletion of target files whose sources were removed upstream

use crate::error::SyncError;
use crate::exclusion::IgnoreMatcher;
use crate::logging::*;
use crate::paths::SyncPaths;
use crate::template::TemplateExtensions;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Counters of one deletion pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
	pub deleted: usize,
	/// Target already absent
	pub missing: usize,
	pub directories_removed: usize,
}

/// Maps removed working-copy paths onto target files and removes them
pub struct DeletionResolver<'a> {
	paths: &'a SyncPaths,
	matcher: &'a IgnoreMatcher,
	templates: &'a TemplateExtensions,
	/// Targets written by the current run; a removed source mapping onto one
	/// of them was renamed into a template or out of one
	reconciled: &'a BTreeSet<PathBuf>,
	delete_empty_dirs: bool,
}

impl<'a> DeletionResolver<'a> {
	pub fn new(
		paths: &'a SyncPaths,
		matcher: &'a IgnoreMatcher,
		templates: &'a TemplateExtensions,
		reconciled: &'a BTreeSet<PathBuf>,
		delete_empty_dirs: bool,
	) -> Self {
		DeletionResolver { paths, matcher, templates, reconciled, delete_empty_dirs }
	}

	/// Target path for a removed working-copy path, `None` if it is not ours
	pub fn resolve(&self, repo_path: &Path) -> Option<PathBuf> {
		let relative = match self.paths.source_relative(repo_path) {
			Some(r) if !r.as_os_str().is_empty() => r,
			_ => {
				debug!("Outside of the project root, not deleting: {}", repo_path.display());
				return None;
			}
		};

		if self.matcher.matches(&relative) {
			debug!("Ignored, not deleting: {}", relative.display());
			return None;
		}

		let target = self.paths.target_path(&relative, self.templates);
		if self.reconciled.contains(&target) {
			debug!("Still provided by the current tree, not deleting: {}", target.display());
			return None;
		}
		Some(target)
	}

	/// Remove the target counterparts of `removed`, in sorted order
	pub fn remove(&self, removed: &[PathBuf]) -> Result<DeletionReport, SyncError> {
		let mut removed = removed.to_vec();
		removed.sort();
		removed.dedup();

		let mut report = DeletionReport::default();
		for repo_path in &removed {
			let target = match self.resolve(repo_path) {
				Some(t) => t,
				None => continue,
			};

			match fs::symlink_metadata(&target) {
				Ok(meta) if meta.is_dir() => {
					warn!("Not deleting directory in place of a removed file: {}", target.display());
					continue;
				}
				Ok(_) => {}
				Err(e) if e.kind() == io::ErrorKind::NotFound => {
					warn!("File already does not exist: {}", target.display());
					report.missing += 1;
					continue;
				}
				Err(e) => return Err(SyncError::io(&target, e)),
			}

			match fs::remove_file(&target) {
				Ok(()) => {}
				Err(e) if e.kind() == io::ErrorKind::NotFound => {
					report.missing += 1;
					continue;
				}
				Err(e) => return Err(SyncError::io(&target, e)),
			}
			info!("Deleted {}", target.display());
			report.deleted += 1;

			if self.delete_empty_dirs && self.remove_parent_if_empty(&target) {
				report.directories_removed += 1;
			}
		}

		Ok(report)
	}

	/// Remove the parent of a deleted file when it became empty
	///
	/// Never removes the target root. Failures are logged only.
	fn remove_parent_if_empty(&self, target: &Path) -> bool {
		let parent = match target.parent() {
			Some(p) => p,
			None => return false,
		};
		if parent == self.paths.target_root || !parent.starts_with(&self.paths.target_root) {
			return false;
		}

		let is_empty = match fs::read_dir(parent) {
			Ok(mut entries) => entries.next().is_none(),
			Err(e) => {
				warn!("Cannot read {}: {}", parent.display(), e);
				return false;
			}
		};
		if !is_empty {
			return false;
		}

		match fs::remove_dir(parent) {
			Ok(()) => {
				info!("Deleted empty directory {}", parent.display());
				true
			}
			Err(e) => {
				warn!("Failed to delete empty directory {}: {}", parent.display(), e);
				false
			}
		}
	}
}


// vim: ts=4
