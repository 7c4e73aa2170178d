//! Configuration for beamsync
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (`--config`, TOML when the extension is `.toml`, JSON5 otherwise)
//! 3. Environment variables (BEAMSYNC_* prefix)
//! 4. CLI flags (highest priority)
//!
//! Layers 3 and 4 are applied by the binary; this module owns the defaults,
//! file loading and validation.

use crate::error::SyncError;
use crate::strategies::{AdapterKind, ComparatorKind, FailurePolicy, GitAuthMethod};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

// ============================================================================
// MAIN CONFIGURATION STRUCT
// ============================================================================

/// Configuration for one synchronization daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	// ========================================================================
	// SOURCE & TARGET
	// ========================================================================
	/// Adapter delivering the source tree
	pub adapter: AdapterKind,

	/// Where the adapter keeps its working copy
	pub working_directory: PathBuf,

	/// Project root inside the working copy; only this subtree is synchronized
	pub root_directory: PathBuf,

	/// Directory the source tree is reconciled onto
	pub target_directory: PathBuf,

	// ========================================================================
	// RECONCILIATION
	// ========================================================================
	/// Digest used for content comparison
	pub comparator: ComparatorKind,

	/// Extensions of files rendered as templates (e.g. ".tmpl")
	pub template_extensions: Vec<String>,

	/// Ignore file name, resolved relative to the source root; empty disables it
	pub ignore_file: String,

	/// Number of concurrent reconciliation workers (0 = auto)
	pub concurrency: usize,

	// ========================================================================
	// DELETION
	// ========================================================================
	/// Delete target files whose source counterparts were removed upstream
	pub sync_delete: bool,

	/// Remove a parent directory left empty by a deletion
	pub sync_delete_empty_directories: bool,

	// ========================================================================
	// RUN CONTROL
	// ========================================================================
	/// Run the workflow and deletions even when the source is not dirty
	pub force_sync: bool,

	/// Run the workflow even when the source is not dirty
	pub force_workflow: bool,

	/// Run once and exit instead of looping
	pub once: bool,

	/// Wait between runs in loop mode (e.g. "5s", "2m")
	pub interval: String,

	/// What the loop does after a failed run
	pub on_failure: FailurePolicy,

	/// Lock file name, created under the target directory
	pub lock_file: String,

	/// State file name, created under the target directory
	pub state_file: String,

	// ========================================================================
	// OUTPUT
	// ========================================================================
	/// Default log level when RUST_LOG is not set
	pub log_level: String,

	// ========================================================================
	// ADAPTERS
	// ========================================================================
	/// Git adapter settings
	pub git: GitConfig,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			adapter: AdapterKind::Git,
			working_directory: PathBuf::from("/tmp/beamsync"),
			root_directory: PathBuf::from("/"),
			target_directory: PathBuf::new(),

			comparator: ComparatorKind::Xxh3,
			template_extensions: Vec::new(),
			ignore_file: ".beamsync-ignore".to_string(),
			concurrency: 0,

			sync_delete: false,
			sync_delete_empty_directories: true,

			force_sync: false,
			force_workflow: false,
			once: false,
			interval: "5s".to_string(),
			on_failure: FailurePolicy::Continue,
			lock_file: ".beamsync.lock".to_string(),
			state_file: ".beamsync".to_string(),

			log_level: "info".to_string(),

			git: GitConfig::default(),
		}
	}
}

impl Config {
	/// Load a config file on top of the defaults
	pub fn load(path: &Path) -> Result<Self, SyncError> {
		let contents = std::fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;

		let is_toml = path.extension().map_or(false, |ext| ext == "toml");
		if is_toml {
			toml::from_str(&contents).map_err(|e| {
				SyncError::config(format!("Failed to parse {}: {}", path.display(), e))
			})
		} else {
			json5::from_str(&contents).map_err(|e| {
				SyncError::config(format!("Failed to parse {}: {}", path.display(), e))
			})
		}
	}

	/// Validate everything that can be checked before touching the filesystem
	pub fn validate(&self) -> Result<(), SyncError> {
		if self.target_directory.as_os_str().is_empty() {
			return Err(SyncError::config("targetDirectory is required"));
		}
		if self.working_directory.as_os_str().is_empty() {
			return Err(SyncError::config("workingDirectory must not be empty"));
		}
		if self.root_directory.components().any(|c| matches!(c, Component::ParentDir)) {
			return Err(SyncError::config(format!(
				"rootDirectory {} contains a parent directory reference (..)",
				self.root_directory.display()
			)));
		}

		let interval = self.interval()?;
		if !self.once && interval.as_secs() == 0 && interval.subsec_nanos() == 0 {
			return Err(SyncError::config("interval must be greater than zero in loop mode"));
		}

		for name in &[&self.ignore_file, &self.lock_file, &self.state_file] {
			if name.contains('/') {
				return Err(SyncError::config(format!("{} must be a plain file name", name)));
			}
		}
		if self.lock_file.is_empty() || self.state_file.is_empty() {
			return Err(SyncError::config("lockFile and stateFile must not be empty"));
		}
		if self.lock_file == self.state_file {
			return Err(SyncError::config("lockFile and stateFile must differ"));
		}

		if self.template_extensions.iter().any(|ext| ext.trim_start_matches('.').is_empty()) {
			return Err(SyncError::config("templateExtensions must not contain empty entries"));
		}

		match self.adapter {
			AdapterKind::Git => self.git.validate(),
		}
	}

	/// Parsed run interval
	pub fn interval(&self) -> Result<Duration, SyncError> {
		parse_duration(&self.interval)
	}

	/// Effective number of reconciliation workers
	pub fn worker_count(&self) -> usize {
		if self.concurrency > 0 {
			return self.concurrency;
		}
		std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
	}

	/// Project root as a path relative to the working copy
	pub fn root_prefix(&self) -> PathBuf {
		self.root_directory
			.components()
			.filter(|c| matches!(c, Component::Normal(_)))
			.collect()
	}
}

// ============================================================================
// NESTED CONFIGURATION STRUCTS
// ============================================================================

/// Git adapter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GitConfig {
	/// Repository URL (or local path) to clone
	pub repository: String,

	/// Branch to follow; "HEAD" or empty means the remote default
	pub branch: String,

	/// Authentication method
	pub auth_method: GitAuthMethod,

	/// SSH private key, either a file path or base64-encoded key material
	pub ssh_private_key: Option<String>,

	/// Passphrase for the SSH private key
	pub ssh_private_key_password: Option<String>,
}

impl Default for GitConfig {
	fn default() -> Self {
		GitConfig {
			repository: String::new(),
			branch: "HEAD".to_string(),
			auth_method: GitAuthMethod::None,
			ssh_private_key: None,
			ssh_private_key_password: None,
		}
	}
}

impl GitConfig {
	fn validate(&self) -> Result<(), SyncError> {
		if self.repository.is_empty() {
			return Err(SyncError::config("git.repository is required for the git adapter"));
		}
		if self.auth_method == GitAuthMethod::Ssh
			&& self.ssh_private_key.as_deref().map_or(true, str::is_empty)
		{
			return Err(SyncError::config("git.sshPrivateKey is required for ssh authentication"));
		}
		Ok(())
	}

	/// Branch name to clone, None when following the remote default
	pub fn branch_name(&self) -> Option<&str> {
		match self.branch.as_str() {
			"" | "HEAD" => None,
			b => Some(b.strip_prefix("refs/heads/").unwrap_or(b)),
		}
	}
}

/// Parse a duration string (e.g., "1d", "2h", "5m", "90s", "90")
pub fn parse_duration(s: &str) -> Result<Duration, SyncError> {
	let s = s.trim().to_lowercase();

	let (num_str, multiplier) = if let Some(n) = s.strip_suffix("ms") {
		let millis: u64 =
			n.parse().map_err(|_| SyncError::config(format!("Invalid duration: {}", s)))?;
		return Ok(Duration::from_millis(millis));
	} else if let Some(n) = s.strip_suffix('d') {
		(n, 24 * 60 * 60)
	} else if let Some(n) = s.strip_suffix('h') {
		(n, 60 * 60)
	} else if let Some(n) = s.strip_suffix('m') {
		(n, 60)
	} else if let Some(n) = s.strip_suffix('s') {
		(n, 1)
	} else {
		// Default to seconds if no unit specified
		(s.as_str(), 1)
	};

	let num: u64 =
		num_str.parse().map_err(|_| SyncError::config(format!("Invalid duration: {}", s)))?;
	let secs = num
		.checked_mul(multiplier)
		.ok_or_else(|| SyncError::config(format!("Duration out of range: {}", s)))?;

	Ok(Duration::from_secs(secs))
}


// vim: ts=4
