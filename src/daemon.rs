//! Run orchestration
//!
//! One run: take the run lock, advance the adapter, and if the source is
//! dirty (or a run is forced) walk, reconcile, and finalize. The daemon
//! repeats runs on an interval until shutdown, or performs exactly one.

use crate::adapter::{create_adapter, Adapter, FinalizeStage};
use crate::comparator::{comparator_for, FileComparator};
use crate::config::Config;
use crate::error::SyncError;
use crate::exclusion::{root_file_pattern, IgnoreMatcher};
use crate::lock::RunLock;
use crate::logging::*;
use crate::paths::SyncPaths;
use crate::reconcile::{Outcome, ReconciliationRecord, Reconciler};
use crate::state::{needs_workflow, DirtyFlag, RevisionMarker, StateStore};
use crate::strategies::FailurePolicy;
use crate::template::{TemplateExtensions, TemplateRenderer};
use crate::walker::walk;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Counters of one completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
	pub marker: Option<RevisionMarker>,
	pub created: usize,
	pub updated: usize,
	pub unchanged: usize,
	pub permissions_fixed: usize,
	pub deleted: usize,
	pub missing: usize,
	pub directories_removed: usize,
}

impl RunReport {
	fn record(&mut self, record: &ReconciliationRecord) {
		match record.outcome {
			Outcome::Created => self.created += 1,
			Outcome::Updated => self.updated += 1,
			Outcome::Unchanged => self.unchanged += 1,
		}
		if record.permissions_changed {
			self.permissions_fixed += 1;
		}
	}

	/// Number of target paths written or removed
	pub fn changes(&self) -> usize {
		self.created + self.updated + self.permissions_fixed + self.deleted + self.directories_removed
	}
}

impl fmt::Display for RunReport {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(
			f,
			"created={} updated={} unchanged={} permissions={} deleted={} missing={} dirs_removed={}",
			self.created,
			self.updated,
			self.unchanged,
			self.permissions_fixed,
			self.deleted,
			self.missing,
			self.directories_removed
		)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
	/// Another run holds the lock; nothing was touched
	Skipped,
	/// Source unchanged since the last committed run
	UpToDate(RevisionMarker),
	Synced(RunReport),
}

/// Everything a run needs, built once at startup
pub struct RunContext {
	config: Config,
	paths: Arc<SyncPaths>,
	templates: TemplateExtensions,
	reconciler: Reconciler,
	state: StateStore,
	lock: RunLock,
	dirty: DirtyFlag,
}

impl RunContext {
	pub fn new(config: Config, dirty: DirtyFlag) -> Self {
		let comparator = comparator_for(config.comparator);
		Self::with_parts(config, dirty, comparator, Arc::new(TemplateRenderer::from_process_env()))
	}

	pub fn with_parts(
		config: Config,
		dirty: DirtyFlag,
		comparator: Arc<dyn FileComparator>,
		renderer: Arc<TemplateRenderer>,
	) -> Self {
		let paths = Arc::new(SyncPaths::from_config(&config));
		let templates = TemplateExtensions::new(&config.template_extensions);
		let reconciler = Reconciler::new(
			Arc::clone(&paths),
			templates.clone(),
			comparator,
			renderer,
			config.worker_count(),
		);
		let state = StateStore::new(paths.target_file(&config.state_file));
		let lock = RunLock::new(paths.target_file(&config.lock_file));

		RunContext { config, paths, templates, reconciler, state, lock, dirty }
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn paths(&self) -> &SyncPaths {
		&self.paths
	}

	pub fn state(&self) -> &StateStore {
		&self.state
	}

	pub fn lock(&self) -> &RunLock {
		&self.lock
	}

	pub fn dirty(&self) -> &DirtyFlag {
		&self.dirty
	}

	/// Patterns excluded from every run
	fn builtin_patterns(&self, adapter: &dyn Adapter) -> Vec<String> {
		let mut patterns = adapter.metadata_patterns();
		patterns.push(root_file_pattern(&self.config.state_file));
		patterns.push(root_file_pattern(&self.config.lock_file));
		patterns
	}

	/// Perform one run
	pub async fn run_once(&self, adapter: &mut dyn Adapter) -> Result<RunOutcome, SyncError> {
		if self.lock.is_locked() {
			warn!("Run lock {} is held, skipping this run", self.lock.path().display());
			return Ok(RunOutcome::Skipped);
		}
		let _guard = match self.lock.lock() {
			Ok(guard) => guard,
			Err(SyncError::LockHeld { path }) => {
				warn!("Lost the race for run lock {}, skipping this run", path.display());
				return Ok(RunOutcome::Skipped);
			}
			Err(e) => return Err(e),
		};

		let previous = self.state.read().await?;
		let outcome = adapter.sync().await?;

		if needs_workflow(previous.as_ref(), &outcome.marker) {
			self.dirty.set_dirty();
		}

		let forced = self.config.force_workflow || self.config.force_sync;
		if !self.dirty.is_dirty() && !forced {
			debug!("Nothing to do at {}", outcome.marker);
			return Ok(RunOutcome::UpToDate(outcome.marker));
		}

		let matcher = Arc::new(IgnoreMatcher::for_source(
			&self.paths.source_root,
			&self.config.ignore_file,
			&self.builtin_patterns(adapter),
		)?);

		let manifest = {
			let root = self.paths.source_root.clone();
			let matcher = Arc::clone(&matcher);
			tokio::task::spawn_blocking(move || walk(&root, &matcher))
				.await
				.map_err(|e| SyncError::TaskFailed { message: e.to_string() })??
		};
		if manifest.is_empty() {
			warn!("No files to reconcile under {}", self.paths.source_root.display());
		} else {
			debug!("{} files to reconcile", manifest.len());
		}

		let mut report = RunReport { marker: Some(outcome.marker.clone()), ..RunReport::default() };
		let mut reconciled = BTreeSet::new();
		for record in self.reconciler.run(&manifest).await? {
			report.record(&record);
			reconciled.insert(record.target);
		}

		let stage = FinalizeStage {
			paths: &self.paths,
			matcher: &matcher,
			templates: &self.templates,
			reconciled: &reconciled,
			state: &self.state,
			dirty: &self.dirty,
			sync_delete: self.config.sync_delete,
			delete_empty_dirs: self.config.sync_delete_empty_directories,
			force_sync: self.config.force_sync,
		};
		let previous_marker = previous.as_ref().map(|s| &s.last_revision);
		let finalized = adapter.finalize(&stage, previous_marker, &outcome.marker).await?;

		if let Some(deletion) = finalized.deletion {
			report.deleted = deletion.deleted;
			report.missing = deletion.missing;
			report.directories_removed = deletion.directories_removed;
		}

		Ok(RunOutcome::Synced(report))
	}
}

/// Adapter plus run context, driven once or on an interval
pub struct Daemon {
	context: RunContext,
	adapter: Box<dyn Adapter>,
}

impl Daemon {
	pub fn new(context: RunContext, adapter: Box<dyn Adapter>) -> Self {
		Daemon { context, adapter }
	}

	/// Validate the configuration and build the configured adapter
	pub fn from_config(config: Config) -> Result<Self, SyncError> {
		config.validate()?;
		let dirty = DirtyFlag::new();
		let adapter = create_adapter(&config, dirty.clone())?;
		Ok(Self::new(RunContext::new(config, dirty), adapter))
	}

	pub fn context(&self) -> &RunContext {
		&self.context
	}

	/// Prepare the target directory and initialize the adapter
	pub async fn init(&mut self) -> Result<RevisionMarker, SyncError> {
		let target = &self.context.paths.target_root;
		tokio::fs::create_dir_all(target).await.map_err(|e| SyncError::io(target, e))?;

		let marker = self.adapter.init().await?;
		info!(
			"{} adapter ready: {} -> {}",
			self.adapter.name(),
			self.context.paths.source_root.display(),
			target.display()
		);
		Ok(marker)
	}

	pub async fn run_once(&mut self) -> Result<RunOutcome, SyncError> {
		self.context.run_once(self.adapter.as_mut()).await
	}

	/// Initialize, then run until done
	///
	/// In once mode a failed run is returned as an error. In loop mode the
	/// failure policy decides between waiting for the next interval and
	/// returning the error. A shutdown request ends the loop after the current
	/// run.
	pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), SyncError> {
		let interval = self.context.config.interval()?;
		self.init().await?;

		loop {
			match self.run_once().await {
				Ok(RunOutcome::Synced(report)) => info!("Run completed: {}", report),
				Ok(RunOutcome::UpToDate(marker)) => debug!("Up to date at {}", marker),
				Ok(RunOutcome::Skipped) => {}
				Err(e) => {
					error!("Run failed: {}", e);
					if self.context.config.once || self.context.config.on_failure == FailurePolicy::Exit {
						return Err(e);
					}
				}
			}

			if self.context.config.once {
				return Ok(());
			}
			if *shutdown.borrow() {
				info!("Shutdown requested, exiting");
				return Ok(());
			}

			tokio::select! {
				_ = tokio::time::sleep(interval) => {}
				_ = shutdown_requested(&mut shutdown) => {
					info!("Shutdown requested, exiting");
					return Ok(());
				}
			}
		}
	}
}

/// Resolves once `true` is sent; never resolves if the sender goes away
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
	loop {
		if shutdown.changed().await.is_err() {
			futures::future::pending::<()>().await;
		}
		if *shutdown.borrow() {
			return;
		}
	}
}


// vim: ts=4
