//! End-to-end run tests against an in-memory adapter
//!
//! The adapter keeps snapshots of its working directory so deletions are
//! resolved exactly like a revision diff would resolve them.

use async_trait::async_trait;
use beamsync::adapter::{Adapter, SyncOutcome};
use beamsync::comparator::comparator_for;
use beamsync::config::Config;
use beamsync::error::{AdapterError, SyncError};
use beamsync::lock::RunLock;
use beamsync::template::TemplateRenderer;
use beamsync::{DirtyFlag, RevisionMarker, RunContext, RunOutcome, RunReport};
use filetime::FileTime;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

// ============================================================================
// Snapshot adapter
// ============================================================================

struct SnapshotAdapter {
	dir: PathBuf,
	dirty: DirtyFlag,
	history: BTreeMap<String, BTreeSet<PathBuf>>,
	head: String,
	pending: Option<String>,
}

impl SnapshotAdapter {
	fn new(dir: PathBuf, dirty: DirtyFlag) -> Self {
		SnapshotAdapter { dir, dirty, history: BTreeMap::new(), head: String::new(), pending: None }
	}

	/// Record the working directory as a new revision, delivered on next sync
	fn commit(&mut self, marker: &str) {
		let mut files = BTreeSet::new();
		list_files(&self.dir, Path::new(""), &mut files);
		self.history.insert(marker.to_string(), files);
		self.pending = Some(marker.to_string());
	}
}

fn list_files(root: &Path, rel: &Path, out: &mut BTreeSet<PathBuf>) {
	for entry in fs::read_dir(root.join(rel)).unwrap() {
		let entry = entry.unwrap();
		let rel = rel.join(entry.file_name());
		if entry.file_type().unwrap().is_dir() {
			list_files(root, &rel, out);
		} else {
			out.insert(rel);
		}
	}
}

#[async_trait]
impl Adapter for SnapshotAdapter {
	fn name(&self) -> &'static str {
		"snapshot"
	}

	fn metadata_patterns(&self) -> Vec<String> {
		vec![".snapshot/**".to_string()]
	}

	async fn init(&mut self) -> Result<RevisionMarker, SyncError> {
		Ok(RevisionMarker::new(self.head.clone()))
	}

	async fn sync(&mut self) -> Result<SyncOutcome, SyncError> {
		let changed = match self.pending.take() {
			Some(marker) => {
				self.head = marker;
				self.dirty.set_dirty();
				true
			}
			None => false,
		};
		Ok(SyncOutcome { changed, marker: RevisionMarker::new(self.head.clone()) })
	}

	async fn removed_paths(
		&self,
		previous: &RevisionMarker,
		current: &RevisionMarker,
	) -> Result<Vec<PathBuf>, SyncError> {
		let lookup = |m: &RevisionMarker| {
			self.history.get(m.as_str()).ok_or_else(|| AdapterError::RevisionNotFound {
				marker: m.to_string(),
				message: "unknown snapshot".to_string(),
			})
		};
		let before = lookup(previous)?;
		let after = lookup(current)?;
		Ok(before.difference(after).cloned().collect())
	}
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
	_dir: TempDir,
	source: PathBuf,
	target: PathBuf,
	dirty: DirtyFlag,
	adapter: SnapshotAdapter,
	config: Config,
}

impl Harness {
	fn new(customize: impl FnOnce(&mut Config)) -> Self {
		let dir = TempDir::new().unwrap();
		let source = dir.path().join("work");
		let target = dir.path().join("target");
		fs::create_dir_all(&source).unwrap();
		fs::create_dir_all(&target).unwrap();

		let mut config = Config::default();
		config.working_directory = source.clone();
		config.target_directory = target.clone();
		config.concurrency = 4;
		customize(&mut config);

		let dirty = DirtyFlag::new();
		let adapter = SnapshotAdapter::new(source.clone(), dirty.clone());
		Harness { _dir: dir, source, target, dirty, adapter, config }
	}

	fn context(&self) -> RunContext {
		let mut vars = BTreeMap::new();
		vars.insert("APP".to_string(), "demo".to_string());
		RunContext::with_parts(
			self.config.clone(),
			self.dirty.clone(),
			comparator_for(self.config.comparator),
			Arc::new(TemplateRenderer::with_env(vars)),
		)
	}

	async fn run(&mut self) -> Result<RunOutcome, SyncError> {
		let context = self.context();
		context.run_once(&mut self.adapter).await
	}

	async fn synced(&mut self) -> RunReport {
		match self.run().await.unwrap() {
			RunOutcome::Synced(report) => report,
			other => panic!("expected a synced run, got {:?}", other),
		}
	}

	fn write(&self, rel: &str, contents: &str) {
		let path = self.source.join(rel);
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		fs::write(path, contents).unwrap();
	}

	fn remove(&self, rel: &str) {
		fs::remove_file(self.source.join(rel)).unwrap();
	}

	fn target(&self, rel: &str) -> PathBuf {
		self.target.join(rel)
	}

	fn read_target(&self, rel: &str) -> String {
		fs::read_to_string(self.target(rel)).unwrap()
	}

	fn persisted_marker(&self) -> Option<String> {
		let raw = fs::read_to_string(self.target(&self.config.state_file)).ok()?;
		let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
		Some(value["lastRevision"].as_str().unwrap().to_string())
	}
}

fn mtime(path: &Path) -> FileTime {
	FileTime::from_last_modification_time(&fs::metadata(path).unwrap())
}

// ============================================================================
// Idempotence and round-trip
// ============================================================================

#[tokio::test]
async fn test_first_run_copies_tree_and_commits_state() {
	let mut h = Harness::new(|_| {});
	h.write("index.html", "<h1>hi</h1>");
	h.write("css/site.css", "body {}");
	h.write("deep/a/b/c.txt", "deep");
	h.adapter.commit("m1");

	let report = h.synced().await;

	assert_eq!(report.created, 3);
	assert_eq!(h.read_target("index.html"), "<h1>hi</h1>");
	assert_eq!(h.read_target("css/site.css"), "body {}");
	assert_eq!(h.read_target("deep/a/b/c.txt"), "deep");
	assert_eq!(h.persisted_marker().as_deref(), Some("m1"));
	assert!(!h.dirty.is_dirty());
	// the lock is released after the run
	assert!(!h.target(&h.config.lock_file).exists());
}

#[tokio::test]
async fn test_second_run_without_change_writes_nothing() {
	let mut h = Harness::new(|_| {});
	h.write("a.txt", "a");
	h.write("sub/b.txt", "b");
	h.adapter.commit("m1");
	h.synced().await;

	let old = FileTime::from_unix_time(1_000_000, 0);
	for rel in &["a.txt", "sub/b.txt", ".beamsync"] {
		filetime::set_file_mtime(h.target(rel), old).unwrap();
	}

	let outcome = h.run().await.unwrap();
	assert_eq!(outcome, RunOutcome::UpToDate(RevisionMarker::new("m1")));

	for rel in &["a.txt", "sub/b.txt", ".beamsync"] {
		assert_eq!(mtime(&h.target(rel)), old, "{} was rewritten", rel);
	}
}

#[tokio::test]
async fn test_forced_workflow_leaves_identical_files_alone() {
	let mut h = Harness::new(|c| c.force_workflow = true);
	h.write("a.txt", "a");
	h.adapter.commit("m1");
	h.synced().await;

	let old = FileTime::from_unix_time(1_000_000, 0);
	filetime::set_file_mtime(h.target("a.txt"), old).unwrap();

	let report = h.synced().await;
	assert_eq!(report.unchanged, 1);
	assert_eq!(report.changes(), 0);
	assert_eq!(mtime(&h.target("a.txt")), old);
}

#[tokio::test]
async fn test_updated_content_is_rewritten() {
	let mut h = Harness::new(|c| c.comparator = "sha256".parse().unwrap());
	h.write("a.txt", "v1");
	h.adapter.commit("m1");
	h.synced().await;

	h.write("a.txt", "v2");
	h.adapter.commit("m2");
	let report = h.synced().await;

	assert_eq!(report.updated, 1);
	assert_eq!(h.read_target("a.txt"), "v2");
	assert_eq!(h.persisted_marker().as_deref(), Some("m2"));
}

// ============================================================================
// Permissions
// ============================================================================

#[cfg(unix)]
#[tokio::test]
async fn test_permissions_converge_without_content_change() {
	use std::os::unix::fs::PermissionsExt;

	let mut h = Harness::new(|c| c.force_workflow = true);
	h.write("run.sh", "#!/bin/sh\n");
	fs::set_permissions(h.source.join("run.sh"), fs::Permissions::from_mode(0o755)).unwrap();
	h.adapter.commit("m1");
	h.synced().await;

	fs::set_permissions(h.target("run.sh"), fs::Permissions::from_mode(0o600)).unwrap();
	let old = FileTime::from_unix_time(1_000_000, 0);
	filetime::set_file_mtime(h.target("run.sh"), old).unwrap();

	let report = h.synced().await;
	assert_eq!(report.unchanged, 1);
	assert_eq!(report.permissions_fixed, 1);

	let mode = fs::metadata(h.target("run.sh")).unwrap().permissions().mode() & 0o7777;
	assert_eq!(mode, 0o755);
	assert_eq!(mtime(&h.target("run.sh")), old);
}

// ============================================================================
// Ignore patterns
// ============================================================================

#[tokio::test]
async fn test_ignored_paths_are_never_touched() {
	let mut h = Harness::new(|c| c.sync_delete = true);
	h.write(".beamsync-ignore", "secret.txt\nlogs/**\n");
	h.write("secret.txt", "from source");
	h.write("logs/app.log", "log line");
	h.write("keep.txt", "keep");
	h.write(".snapshot/meta", "adapter metadata");
	fs::write(h.target("secret.txt"), "target owned").unwrap();
	h.adapter.commit("m1");

	let report = h.synced().await;
	assert_eq!(report.created, 1);
	assert_eq!(h.read_target("secret.txt"), "target owned");
	assert!(!h.target("logs").exists());
	assert!(!h.target(".beamsync-ignore").exists());
	assert!(!h.target(".snapshot").exists());

	// an ignored path removed upstream stays on the target
	fs::create_dir_all(h.target("logs")).unwrap();
	fs::write(h.target("logs/app.log"), "target log").unwrap();
	h.remove("logs/app.log");
	h.remove("secret.txt");
	h.adapter.commit("m2");

	let report = h.synced().await;
	assert_eq!(report.deleted, 0);
	assert_eq!(h.read_target("logs/app.log"), "target log");
	assert_eq!(h.read_target("secret.txt"), "target owned");
}

#[tokio::test]
async fn test_blank_ignore_file_name_syncs_everything() {
	let mut h = Harness::new(|c| c.ignore_file = String::new());
	h.write(".beamsync-ignore", "page.html\n");
	h.write("page.html", "page");
	h.adapter.commit("m1");

	let report = h.synced().await;
	assert_eq!(report.created, 2);
	assert_eq!(h.read_target("page.html"), "page");
	assert!(h.target(".beamsync-ignore").exists());
}

#[tokio::test]
async fn test_ignore_file_directory_is_not_fatal() {
	let mut h = Harness::new(|_| {});
	h.write(".beamsync-ignore/notes.txt", "notes");
	h.write("page.html", "page");
	h.adapter.commit("m1");

	let report = h.synced().await;
	assert_eq!(report.created, 2);
	assert_eq!(h.read_target(".beamsync-ignore/notes.txt"), "notes");
}

#[tokio::test]
async fn test_source_cannot_overwrite_bookkeeping_files() {
	let mut h = Harness::new(|_| {});
	h.write(".beamsync", "{\"lastRevision\":\"forged\"}");
	h.write("page.html", "page");
	h.adapter.commit("m1");

	h.synced().await;
	assert_eq!(h.persisted_marker().as_deref(), Some("m1"));
}

// ============================================================================
// Deletion
// ============================================================================

#[tokio::test]
async fn test_removed_file_is_deleted_from_target() {
	let mut h = Harness::new(|c| c.sync_delete = true);
	h.write("a", "a");
	h.write("b", "b");
	h.write("c", "c");
	h.adapter.commit("m1");
	h.synced().await;

	h.remove("b");
	h.adapter.commit("m2");
	let report = h.synced().await;

	assert_eq!(report.deleted, 1);
	assert!(h.target("a").exists());
	assert!(!h.target("b").exists());
	assert!(h.target("c").exists());
}

#[tokio::test]
async fn test_deletion_disabled_by_default() {
	let mut h = Harness::new(|_| {});
	h.write("a", "a");
	h.write("b", "b");
	h.adapter.commit("m1");
	h.synced().await;

	h.remove("b");
	h.adapter.commit("m2");
	let report = h.synced().await;

	assert_eq!(report.deleted, 0);
	assert!(h.target("b").exists());
}

#[tokio::test]
async fn test_emptied_directory_is_removed() {
	let mut h = Harness::new(|c| c.sync_delete = true);
	h.write("docs/old.md", "old");
	h.write("index.md", "index");
	h.adapter.commit("m1");
	h.synced().await;

	h.remove("docs/old.md");
	fs::remove_dir(h.source.join("docs")).unwrap();
	h.adapter.commit("m2");
	let report = h.synced().await;

	assert_eq!(report.deleted, 1);
	assert_eq!(report.directories_removed, 1);
	assert!(!h.target("docs").exists());
	assert!(h.target.exists());
}

#[tokio::test]
async fn test_deletion_spans_skipped_revisions() {
	let mut h = Harness::new(|c| c.sync_delete = true);
	h.write("a", "a");
	h.write("b", "b");
	h.write("c", "c");
	h.adapter.commit("m1");
	h.synced().await;

	// two upstream revisions land between runs
	h.remove("b");
	h.adapter.commit("m2");
	h.remove("c");
	h.adapter.commit("m3");

	let report = h.synced().await;
	assert_eq!(report.deleted, 2);
	assert!(h.target("a").exists());
	assert!(!h.target("b").exists());
	assert!(!h.target("c").exists());
}

// ============================================================================
// Templates
// ============================================================================

#[tokio::test]
async fn test_template_rendered_then_deleted() {
	let mut h = Harness::new(|c| {
		c.template_extensions = vec![".tmpl".to_string()];
		c.sync_delete = true;
	});
	h.write("config.yaml.tmpl", "app: {{ env.APP }}\n");
	h.adapter.commit("m1");

	let report = h.synced().await;
	assert_eq!(report.created, 1);
	assert_eq!(h.read_target("config.yaml"), "app: demo\n");
	assert!(!h.target("config.yaml.tmpl").exists());

	h.remove("config.yaml.tmpl");
	h.adapter.commit("m2");
	let report = h.synced().await;

	assert_eq!(report.deleted, 1);
	assert!(!h.target("config.yaml").exists());
}

#[tokio::test]
async fn test_switching_to_and_from_template_keeps_target() {
	let mut h = Harness::new(|c| {
		c.template_extensions = vec![".tmpl".to_string()];
		c.sync_delete = true;
	});
	h.write("config.yaml", "app: plain\n");
	h.adapter.commit("m1");
	h.synced().await;

	// plain file replaced by a template rendering to the same target
	h.remove("config.yaml");
	h.write("config.yaml.tmpl", "app: {{ env.APP }}\n");
	h.adapter.commit("m2");
	let report = h.synced().await;

	assert_eq!(report.updated, 1);
	assert_eq!(report.deleted, 0);
	assert_eq!(h.read_target("config.yaml"), "app: demo\n");

	// and back again
	h.remove("config.yaml.tmpl");
	h.write("config.yaml", "app: plain again\n");
	h.adapter.commit("m3");
	let report = h.synced().await;

	assert_eq!(report.updated, 1);
	assert_eq!(report.deleted, 0);
	assert_eq!(h.read_target("config.yaml"), "app: plain again\n");
	assert_eq!(h.persisted_marker().as_deref(), Some("m3"));
}

#[tokio::test]
async fn test_template_error_aborts_without_commit() {
	let mut h = Harness::new(|c| c.template_extensions = vec!["tmpl".to_string()]);
	h.write("bad.conf.tmpl", "{{ env.NOT_SET_ANYWHERE }}");
	h.adapter.commit("m1");

	let err = h.run().await.unwrap_err();
	assert!(matches!(err, SyncError::Reconcile { .. }));
	assert_eq!(h.persisted_marker(), None);
	assert!(!h.target(&h.config.lock_file).exists());
}

// ============================================================================
// Locking
// ============================================================================

#[tokio::test]
async fn test_held_lock_skips_run() {
	let mut h = Harness::new(|c| c.force_sync = true);
	h.write("a.txt", "a");
	h.adapter.commit("m1");

	let lock = RunLock::new(h.target(&h.config.lock_file));
	let guard = lock.lock().unwrap();

	let outcome = h.run().await.unwrap();
	assert_eq!(outcome, RunOutcome::Skipped);
	assert!(!h.target("a.txt").exists());
	assert!(lock.is_locked());
	assert_eq!(h.persisted_marker(), None);

	drop(guard);
	h.synced().await;
	assert!(h.target("a.txt").exists());
}

// ============================================================================
// Crash safety
// ============================================================================

#[tokio::test]
async fn test_failed_run_keeps_previous_marker_as_diff_base() {
	let mut h = Harness::new(|c| c.sync_delete = true);
	h.write("a", "a");
	h.write("b", "b");
	h.adapter.commit("m1");
	h.synced().await;

	// m2 removes b and adds a file whose target is blocked by a directory
	h.remove("b");
	h.write("clash", "file");
	fs::create_dir_all(h.target("clash")).unwrap();
	h.adapter.commit("m2");

	assert!(h.run().await.is_err());
	assert_eq!(h.persisted_marker().as_deref(), Some("m1"));
	assert!(h.target("b").exists());
	assert!(!h.target(&h.config.lock_file).exists());

	// the adapter has nothing new, but the stored marker still lags
	fs::remove_dir(h.target("clash")).unwrap();
	h.dirty.set_clean();
	let report = h.synced().await;

	assert_eq!(report.deleted, 1);
	assert!(!h.target("b").exists());
	assert_eq!(h.read_target("clash"), "file");
	assert_eq!(h.persisted_marker().as_deref(), Some("m2"));
}

#[tokio::test]
async fn test_corrupted_state_is_fatal() {
	let mut h = Harness::new(|_| {});
	h.write("a", "a");
	h.adapter.commit("m1");
	fs::write(h.target(".beamsync"), "garbage").unwrap();

	let err = h.run().await.unwrap_err();
	assert!(matches!(err, SyncError::State(_)));
	assert_eq!(fs::read_to_string(h.target(".beamsync")).unwrap(), "garbage");
	assert!(!h.target("a").exists());
}

// vim: ts=4
