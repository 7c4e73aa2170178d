//! Ignore file parsing
//!
//! One glob per line. Blank lines are skipped and a trailing `\r` is dropped;
//! everything else (including lines starting with `#`) is taken literally.

use crate::error::ExclusionError;
use crate::logging::*;
use std::io;
use std::path::Path;

/// Parser for the ignore file
pub struct IgnoreFileParser;

impl IgnoreFileParser {
	/// Read patterns from an ignore file
	///
	/// A missing file yields no patterns. Any other read failure is an error.
	pub fn parse_file(path: &Path) -> Result<Vec<String>, ExclusionError> {
		if path.is_dir() {
			debug!("Ignore file {} is a directory, not using it", path.display());
			return Ok(Vec::new());
		}
		match std::fs::read_to_string(path) {
			Ok(contents) => Ok(Self::parse_contents(&contents)),
			Err(e) if e.kind() == io::ErrorKind::NotFound => {
				debug!("No ignore file at {}", path.display());
				Ok(Vec::new())
			}
			Err(e) => Err(ExclusionError::IgnoreFileError(format!(
				"Failed to read {}: {}",
				path.display(),
				e
			))),
		}
	}

	/// Parse ignore file contents
	pub fn parse_contents(contents: &str) -> Vec<String> {
		contents
			.split('\n')
			.map(|line| line.strip_suffix('\r').unwrap_or(line))
			.filter(|line| !line.is_empty())
			.map(String::from)
			.collect()
	}
}


// vim: ts=4
