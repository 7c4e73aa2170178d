//! Consolidated strategy and mode enums
//!
//! Each enum implements `FromStr` (CLI and environment parsing, with a few
//! aliases) and `Display` (the canonical kebab-case name used in config files).

use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// ADAPTER
// ============================================================================

/// Source adapter supplying the revision-controlled tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AdapterKind {
	/// Git working copy (clone + fast-forward pull)
	#[default]
	Git,
}

impl FromStr for AdapterKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"git" => Ok(Self::Git),
			_ => Err(format!("Adapter {} is not supported. Valid options: git", s)),
		}
	}
}

impl std::fmt::Display for AdapterKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Git => write!(f, "git"),
		}
	}
}

// ============================================================================
// FILE COMPARATOR
// ============================================================================

/// Digest used to decide whether two files are identical
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ComparatorKind {
	/// XXH3-64, fast and non-cryptographic (default)
	#[default]
	Xxh3,

	/// MD5, fast but collision-prone
	Md5,

	/// SHA-256
	Sha256,

	/// BLAKE3
	Blake3,
}

impl FromStr for ComparatorKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"xxh3" | "xxhash" | "fast" => Ok(Self::Xxh3),
			"md5" => Ok(Self::Md5),
			"sha256" | "sha-256" => Ok(Self::Sha256),
			"blake3" => Ok(Self::Blake3),
			_ => Err(format!(
				"File comparator {} is not supported. Valid options: xxh3, md5, sha256, blake3",
				s
			)),
		}
	}
}

impl std::fmt::Display for ComparatorKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Xxh3 => write!(f, "xxh3"),
			Self::Md5 => write!(f, "md5"),
			Self::Sha256 => write!(f, "sha256"),
			Self::Blake3 => write!(f, "blake3"),
		}
	}
}

// ============================================================================
// LOOP FAILURE POLICY
// ============================================================================

/// What the scheduling loop does after a failed run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
	/// Log the failure and wait for the next interval (default)
	#[default]
	Continue,

	/// Stop the loop and exit with a non-zero status
	Exit,
}

impl FromStr for FailurePolicy {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"continue" | "keep-going" => Ok(Self::Continue),
			"exit" | "abort" | "stop" => Ok(Self::Exit),
			_ => Err(format!("Unknown failure policy: {}. Valid options: continue, exit", s)),
		}
	}
}

impl std::fmt::Display for FailurePolicy {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Continue => write!(f, "continue"),
			Self::Exit => write!(f, "exit"),
		}
	}
}

// ============================================================================
// GIT AUTHENTICATION
// ============================================================================

/// Authentication method for the git adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum GitAuthMethod {
	/// Anonymous / transport default
	#[default]
	None,

	/// SSH private key
	Ssh,
}

impl FromStr for GitAuthMethod {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"none" | "" => Ok(Self::None),
			"ssh" => Ok(Self::Ssh),
			_ => Err(format!("Unknown git auth method: {}. Valid options: none, ssh", s)),
		}
	}
}

impl std::fmt::Display for GitAuthMethod {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::None => write!(f, "none"),
			Self::Ssh => write!(f, "ssh"),
		}
	}
}


// vim: ts=4
