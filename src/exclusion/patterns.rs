//! Glob pattern compilation and matching

use crate::error::ExclusionError;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::Path;

/// Compiled ignore patterns
///
/// `*` never crosses a `/`, `**` does. Every pattern of the form `dir/**` is
/// also compiled as a directory pattern so whole subtrees can be pruned during
/// traversal without changing which files match.
pub struct PatternMatcher {
	/// Every pattern, as written
	file_set: GlobSet,

	/// Prefixes of the `.../**` patterns
	dir_set: GlobSet,
}

impl PatternMatcher {
	/// Compile a list of patterns; the first malformed one is an error
	pub fn new(patterns: &[String]) -> Result<Self, ExclusionError> {
		let file_set = Self::build_glob_set(patterns.iter().map(String::as_str))?;
		let dir_set =
			Self::build_glob_set(patterns.iter().filter_map(|p| p.strip_suffix("/**")))?;

		Ok(Self { file_set, dir_set })
	}

	fn build_glob_set<'a>(
		patterns: impl Iterator<Item = &'a str>,
	) -> Result<GlobSet, ExclusionError> {
		let mut builder = GlobSetBuilder::new();

		for pattern in patterns {
			let glob = GlobBuilder::new(pattern)
				.literal_separator(true)
				.build()
				.map_err(|e| ExclusionError::InvalidPattern(format!("{}: {}", pattern, e)))?;
			builder.add(glob);
		}

		builder.build().map_err(|e| {
			ExclusionError::InvalidPattern(format!("Failed to build pattern set: {}", e))
		})
	}

	/// Whether any pattern matches the relative path
	pub fn is_match(&self, path: &Path) -> bool {
		self.file_set.is_match(path)
	}

	/// Whether everything below the relative directory path is matched
	pub fn is_dir_match(&self, path: &Path) -> bool {
		self.dir_set.is_match(path)
	}
}


// vim: ts=4
