//! Path layout of one synchronization: working copy, project root, target

use crate::config::Config;
use crate::template::TemplateExtensions;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SyncPaths {
	/// Adapter working copy
	pub working_dir: PathBuf,

	/// Project root relative to the working copy (empty for the whole tree)
	pub root_prefix: PathBuf,

	/// `working_dir` joined with `root_prefix`
	pub source_root: PathBuf,

	pub target_root: PathBuf,
}

impl SyncPaths {
	pub fn new(working_dir: PathBuf, root_prefix: PathBuf, target_root: PathBuf) -> Self {
		let source_root = if root_prefix.as_os_str().is_empty() {
			working_dir.clone()
		} else {
			working_dir.join(&root_prefix)
		};
		SyncPaths { working_dir, root_prefix, source_root, target_root }
	}

	pub fn from_config(config: &Config) -> Self {
		Self::new(
			config.working_directory.clone(),
			config.root_prefix(),
			config.target_directory.clone(),
		)
	}

	/// Rebase a working-copy-relative path onto the project root
	///
	/// `None` when the path lies outside the project root.
	pub fn source_relative(&self, repo_path: &Path) -> Option<PathBuf> {
		repo_path.strip_prefix(&self.root_prefix).ok().map(Path::to_path_buf)
	}

	pub fn source_path(&self, relative: &Path) -> PathBuf {
		self.source_root.join(relative)
	}

	/// Target path of a source-relative path, template extension removed
	pub fn target_path(&self, relative: &Path, templates: &TemplateExtensions) -> PathBuf {
		self.target_root.join(templates.target_name(relative))
	}

	/// Bookkeeping file under the target directory
	pub fn target_file(&self, name: &str) -> PathBuf {
		self.target_root.join(name)
	}
}


// vim: ts=4
