//! Git adapter: clone, fast-forward pull, tree diff
//!
//! Every git operation opens the repository afresh inside `spawn_blocking`;
//! `git2::Repository` is not `Sync` and all of libgit2 blocks.

use super::{Adapter, SyncOutcome};
use crate::config::GitConfig;
use crate::error::{AdapterError, SyncError};
use crate::logging::*;
use crate::state::{DirtyFlag, RevisionMarker};
use crate::strategies::GitAuthMethod;
use async_trait::async_trait;
use base64::Engine;
use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{Cred, Delta, FetchOptions, Oid, RemoteCallbacks, Repository, Tree};
use std::fs;
use std::path::{Path, PathBuf};

const REMOTE: &str = "origin";

pub struct GitAdapter {
	config: GitConfig,
	working_dir: PathBuf,
	dirty: DirtyFlag,
	initialized: bool,
}

impl GitAdapter {
	pub fn new(config: GitConfig, working_dir: PathBuf, dirty: DirtyFlag) -> Self {
		GitAdapter { config, working_dir, dirty, initialized: false }
	}

	fn ensure_initialized(&self) -> Result<(), SyncError> {
		if self.initialized {
			Ok(())
		} else {
			Err(AdapterError::NotInitialized.into())
		}
	}
}

/// Run blocking git work off the async runtime
async fn blocking<F, R>(f: F) -> Result<R, SyncError>
where
	F: FnOnce() -> Result<R, AdapterError> + Send + 'static,
	R: Send + 'static,
{
	match tokio::task::spawn_blocking(f).await {
		Ok(result) => result.map_err(SyncError::from),
		Err(e) => Err(SyncError::TaskFailed { message: e.to_string() }),
	}
}

#[async_trait]
impl Adapter for GitAdapter {
	fn name(&self) -> &'static str {
		"git"
	}

	fn metadata_patterns(&self) -> Vec<String> {
		vec![".git/**".to_string()]
	}

	async fn init(&mut self) -> Result<RevisionMarker, SyncError> {
		let config = self.config.clone();
		let dir = self.working_dir.clone();

		let head = blocking(move || open_or_clone(&config, &dir)).await?;
		self.initialized = true;
		info!("Repository ready at {} ({})", self.working_dir.display(), head);
		Ok(RevisionMarker::new(head))
	}

	async fn sync(&mut self) -> Result<SyncOutcome, SyncError> {
		self.ensure_initialized()?;
		let config = self.config.clone();
		let dir = self.working_dir.clone();

		let (changed, head) = blocking(move || pull(&config, &dir)).await?;
		if changed {
			info!("Repository pulled: {}", head);
			self.dirty.set_dirty();
		} else {
			debug!("Repository already up to date: {}", head);
		}
		Ok(SyncOutcome { changed, marker: RevisionMarker::new(head) })
	}

	async fn removed_paths(
		&self,
		previous: &RevisionMarker,
		current: &RevisionMarker,
	) -> Result<Vec<PathBuf>, SyncError> {
		self.ensure_initialized()?;
		let dir = self.working_dir.clone();
		let (prev, cur) = (previous.to_string(), current.to_string());

		blocking(move || deleted_between(&dir, &prev, &cur)).await
	}
}

/// Open an existing working copy or clone a fresh one; returns HEAD
fn open_or_clone(config: &GitConfig, dir: &Path) -> Result<String, AdapterError> {
	let init_failed = |e: git2::Error| AdapterError::InitFailed { message: e.message().to_string() };

	let repo = if dir.join(".git").exists() {
		debug!("Opening existing repository at {}", dir.display());
		let repo = Repository::open(dir).map_err(init_failed)?;
		{
			let remote = repo.find_remote(REMOTE).map_err(init_failed)?;
			let actual = remote.url().unwrap_or_default();
			if actual != config.repository {
				return Err(AdapterError::RemoteMismatch {
					expected: config.repository.clone(),
					actual: actual.to_string(),
				});
			}
		}
		repo
	} else {
		info!("Cloning {} into {}", config.repository, dir.display());
		fs::create_dir_all(dir).map_err(|e| AdapterError::InitFailed {
			message: format!("Cannot create {}: {}", dir.display(), e),
		})?;

		let mut builder = RepoBuilder::new();
		if let Some(branch) = config.branch_name() {
			builder.branch(branch);
		}
		builder.fetch_options(fetch_options(config)?);
		builder.clone(&config.repository, dir).map_err(init_failed)?
	};

	let head = repo.head().and_then(|h| h.peel_to_commit()).map_err(init_failed)?;
	Ok(head.id().to_string())
}

/// Fetch the current branch and fast-forward to it; returns (moved, HEAD)
fn pull(config: &GitConfig, dir: &Path) -> Result<(bool, String), AdapterError> {
	let repo = Repository::open(dir)?;

	let head = repo.head()?;
	if !head.is_branch() {
		return Err(AdapterError::SyncFailed {
			message: "HEAD is detached, cannot determine the branch to pull".to_string(),
		});
	}
	let branch = match head.shorthand() {
		Some(name) => name.to_string(),
		None => {
			return Err(AdapterError::SyncFailed { message: "Branch name is not UTF-8".to_string() })
		}
	};
	let head_commit = head.peel_to_commit()?;

	let mut remote = repo.find_remote(REMOTE)?;
	let mut options = fetch_options(config)?;
	remote.fetch(&[&branch], Some(&mut options), None).map_err(|e| AdapterError::SyncFailed {
		message: format!("Fetch failed: {}", e.message()),
	})?;

	let fetch_head = repo.find_reference("FETCH_HEAD").map_err(|e| AdapterError::SyncFailed {
		message: format!("Could not find FETCH_HEAD: {}", e.message()),
	})?;
	let fetch_commit = fetch_head.peel_to_commit().map_err(|e| AdapterError::SyncFailed {
		message: format!("Could not resolve FETCH_HEAD: {}", e.message()),
	})?;

	let (analysis, _) = repo.merge_analysis(&[&repo.find_annotated_commit(fetch_commit.id())?])?;

	if analysis.is_up_to_date() {
		return Ok((false, head_commit.id().to_string()));
	}

	if analysis.is_fast_forward() {
		let refname = format!("refs/heads/{}", branch);
		let mut reference = repo.find_reference(&refname)?;
		reference
			.set_target(fetch_commit.id(), &format!("pull: fast-forward to {}", fetch_commit.id()))?;
		repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
		return Ok((true, fetch_commit.id().to_string()));
	}

	Err(AdapterError::CannotFastForward {
		message: format!(
			"Cannot fast-forward {} from {} to {}",
			branch,
			head_commit.id(),
			fetch_commit.id()
		),
	})
}

/// Paths present in `previous` and absent in `current`
fn deleted_between(dir: &Path, previous: &str, current: &str) -> Result<Vec<PathBuf>, AdapterError> {
	let repo = Repository::open(dir)?;

	let old_tree = find_tree(&repo, previous)?;
	let new_tree = find_tree(&repo, current)?;
	let diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)?;

	let removed: Vec<PathBuf> = diff
		.deltas()
		.filter(|delta| delta.status() == Delta::Deleted)
		.filter_map(|delta| delta.old_file().path().map(Path::to_path_buf))
		.collect();

	debug!("{} paths removed between {} and {}", removed.len(), previous, current);
	Ok(removed)
}

fn find_tree<'r>(repo: &'r Repository, marker: &str) -> Result<Tree<'r>, AdapterError> {
	let not_found = |e: git2::Error| AdapterError::RevisionNotFound {
		marker: marker.to_string(),
		message: e.message().to_string(),
	};
	let oid = Oid::from_str(marker).map_err(not_found)?;
	let commit = repo.find_commit(oid).map_err(not_found)?;
	commit.tree().map_err(not_found)
}

fn fetch_options(config: &GitConfig) -> Result<FetchOptions<'static>, AdapterError> {
	let mut options = FetchOptions::new();

	if config.auth_method == GitAuthMethod::Ssh {
		let key = load_private_key(config)?;
		let passphrase = config.ssh_private_key_password.clone();

		let mut callbacks = RemoteCallbacks::new();
		callbacks.credentials(move |_url, username, _allowed| {
			Cred::ssh_key_from_memory(username.unwrap_or("git"), None, &key, passphrase.as_deref())
		});
		options.remote_callbacks(callbacks);
	}

	Ok(options)
}

/// SSH key material from a file path, or base64-encoded inline
fn load_private_key(config: &GitConfig) -> Result<String, AdapterError> {
	let value = config.ssh_private_key.as_deref().unwrap_or_default().trim();
	if value.is_empty() {
		return Err(AdapterError::AuthFailed { message: "No SSH private key configured".to_string() });
	}

	let path = Path::new(value);
	if path.is_file() {
		return fs::read_to_string(path).map_err(|e| AdapterError::AuthFailed {
			message: format!("Cannot read {}: {}", path.display(), e),
		});
	}

	let decoded = base64::engine::general_purpose::STANDARD.decode(value).map_err(|e| {
		AdapterError::AuthFailed {
			message: format!("SSH private key is neither a readable file nor base64: {}", e),
		}
	})?;
	String::from_utf8(decoded).map_err(|_| AdapterError::AuthFailed {
		message: "Decoded SSH private key is not UTF-8".to_string(),
	})
}


// vim: ts=4
