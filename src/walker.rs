//! Source tree enumeration

use crate::error::SyncError;
use crate::exclusion::IgnoreMatcher;
use crate::logging::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Relative paths of every file to reconcile, in sorted order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileManifest {
	files: BTreeSet<PathBuf>,
}

impl FileManifest {
	pub fn insert(&mut self, path: PathBuf) -> bool {
		self.files.insert(path)
	}

	pub fn len(&self) -> usize {
		self.files.len()
	}

	pub fn is_empty(&self) -> bool {
		self.files.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
		self.files.iter()
	}

	/// Parent directories needed by the manifest, excluding the root itself
	pub fn directories(&self) -> BTreeSet<PathBuf> {
		self.files
			.iter()
			.filter_map(|p| p.parent())
			.filter(|p| !p.as_os_str().is_empty())
			.map(Path::to_path_buf)
			.collect()
	}
}

impl IntoIterator for FileManifest {
	type Item = PathBuf;
	type IntoIter = std::collections::btree_set::IntoIter<PathBuf>;

	fn into_iter(self) -> Self::IntoIter {
		self.files.into_iter()
	}
}

impl std::iter::FromIterator<PathBuf> for FileManifest {
	fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
		FileManifest { files: iter.into_iter().collect() }
	}
}

/// Enumerate every non-ignored file below `root`
///
/// Symlinked directories are not followed. A symlink to a regular file counts
/// as a file; a dangling symlink is skipped.
pub fn walk(root: &Path, matcher: &IgnoreMatcher) -> Result<FileManifest, SyncError> {
	let mut manifest = FileManifest::default();
	scan_dir(root, Path::new(""), matcher, &mut manifest)?;
	debug!("Walked {}: {} files", root.display(), manifest.len());
	Ok(manifest)
}

fn scan_dir(
	root: &Path,
	relative_dir: &Path,
	matcher: &IgnoreMatcher,
	manifest: &mut FileManifest,
) -> Result<(), SyncError> {
	let dir = root.join(relative_dir);
	let entries = fs::read_dir(&dir).map_err(|e| SyncError::io(&dir, e))?;

	for entry_result in entries {
		let entry = entry_result.map_err(|e| SyncError::io(&dir, e))?;
		let relative = relative_dir.join(entry.file_name());
		let path = entry.path();

		let meta = fs::symlink_metadata(&path).map_err(|e| SyncError::io(&path, e))?;

		if meta.is_dir() {
			if matcher.matches_dir(&relative) {
				debug!("Ignoring directory: {}", relative.display());
				continue;
			}
			scan_dir(root, &relative, matcher, manifest)?;
			continue;
		}

		let is_file = if meta.file_type().is_symlink() {
			match fs::metadata(&path) {
				Ok(target) if target.is_file() => true,
				Ok(_) => {
					debug!("Not following symlinked directory: {}", relative.display());
					false
				}
				Err(_) => {
					debug!("Skipping dangling symlink: {}", relative.display());
					false
				}
			}
		} else {
			meta.is_file()
		};

		if !is_file {
			continue;
		}

		if matcher.matches(&relative) {
			debug!("Ignoring: {}", relative.display());
			continue;
		}

		manifest.insert(relative);
	}

	Ok(())
}


// vim: ts=4
