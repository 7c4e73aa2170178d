//! Ignore-pattern exclusion
//!
//! Builds the ignore set for one run: built-in patterns (the ignore file
//! itself, adapter metadata, the daemon's own state and lock files) plus the
//! patterns of the ignore file found at the source root.

mod ignore;
mod patterns;

pub use self::ignore::IgnoreFileParser;
pub use self::patterns::PatternMatcher;

use crate::error::ExclusionError;
use crate::logging::*;
use std::path::Path;

/// Classifies source-relative paths as included or ignored
pub struct IgnoreMatcher {
	patterns: Vec<String>,
	matcher: PatternMatcher,
}

impl IgnoreMatcher {
	/// Compile an ignore set from explicit patterns
	pub fn new(patterns: Vec<String>) -> Result<Self, ExclusionError> {
		let matcher = PatternMatcher::new(&patterns)?;
		Ok(Self { patterns, matcher })
	}

	/// Build the ignore set for a source root
	///
	/// `builtin` holds adapter metadata patterns and any other fixed
	/// exclusions; `ignore_file` is a plain file name looked up at `source_root`.
	/// An empty `ignore_file` disables the ignore file.
	pub fn for_source(
		source_root: &Path,
		ignore_file: &str,
		builtin: &[String],
	) -> Result<Self, ExclusionError> {
		let mut patterns = Vec::new();
		if !ignore_file.is_empty() {
			patterns.push(format!("**/{}", globset::escape(ignore_file)));
		}
		patterns.extend(builtin.iter().cloned());
		if !ignore_file.is_empty() {
			patterns.extend(IgnoreFileParser::parse_file(&source_root.join(ignore_file))?);
		}

		debug!("Ignoring patterns: {:?}", patterns);
		Self::new(patterns)
	}

	/// Whether a relative file path is ignored
	pub fn matches(&self, path: &Path) -> bool {
		self.matcher.is_match(path)
	}

	/// Whether a relative directory can be skipped entirely
	pub fn matches_dir(&self, path: &Path) -> bool {
		self.matcher.is_dir_match(path)
	}

	pub fn patterns(&self) -> &[String] {
		&self.patterns
	}
}

/// Pattern matching a plain file name at the root only
pub fn root_file_pattern(name: &str) -> String {
	globset::escape(name)
}


// vim: ts=4
