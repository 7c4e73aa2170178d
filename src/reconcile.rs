//! Reconciliation of source files onto the target tree
//!
//! For every manifest entry the target is created, updated, or left alone
//! depending on a content comparison, and its permission bits are aligned
//! with the source. Template files are rendered first and land on the target
//! without their template extension. Content is written to a temporary file
//! next to the target and renamed over it.

use crate::comparator::FileComparator;
use crate::error::SyncError;
use crate::logging::*;
use crate::paths::SyncPaths;
use crate::pool::fan_out;
use crate::template::{TemplateExtensions, TemplateRenderer};
use crate::walker::FileManifest;
use std::collections::BTreeMap;
use std::fs::{self, File, Permissions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What happened to one target file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Created,
	Updated,
	Unchanged,
}

/// Result of reconciling one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationRecord {
	pub source: PathBuf,
	pub target: PathBuf,
	pub templated: bool,
	pub outcome: Outcome,
	/// Permission bits were fixed without rewriting content
	pub permissions_changed: bool,
}

/// One manifest entry resolved to concrete paths
#[derive(Debug, Clone)]
pub struct PlannedFile {
	pub relative: PathBuf,
	pub source: PathBuf,
	pub target: PathBuf,
	pub templated: bool,
}

/// Shared, immutable inputs of the file workers
struct FileContext {
	comparator: Arc<dyn FileComparator>,
	renderer: Arc<TemplateRenderer>,
}

pub struct Reconciler {
	paths: Arc<SyncPaths>,
	templates: TemplateExtensions,
	context: Arc<FileContext>,
	workers: usize,
}

impl Reconciler {
	pub fn new(
		paths: Arc<SyncPaths>,
		templates: TemplateExtensions,
		comparator: Arc<dyn FileComparator>,
		renderer: Arc<TemplateRenderer>,
		workers: usize,
	) -> Self {
		Reconciler { paths, templates, context: Arc::new(FileContext { comparator, renderer }), workers }
	}

	/// Resolve target paths, rejecting entries that collide on one target
	pub fn plan(&self, manifest: &FileManifest) -> Result<Vec<PlannedFile>, SyncError> {
		let mut by_target: BTreeMap<PathBuf, PathBuf> = BTreeMap::new();
		let mut plan = Vec::with_capacity(manifest.len());

		for relative in manifest.iter() {
			let target = self.paths.target_path(relative, &self.templates);
			if let Some(first) = by_target.get(&target) {
				return Err(SyncError::TargetCollision {
					target,
					first: first.clone(),
					second: relative.clone(),
				});
			}
			by_target.insert(target.clone(), relative.clone());

			plan.push(PlannedFile {
				relative: relative.clone(),
				source: self.paths.source_path(relative),
				target,
				templated: self.templates.is_template(relative),
			});
		}

		Ok(plan)
	}

	/// Create every target directory the manifest needs
	///
	/// Returns the number of directories created by this call.
	pub async fn create_directories(&self, manifest: &FileManifest) -> Result<usize, SyncError> {
		let dirs: Vec<PathBuf> = manifest.directories().into_iter().collect();
		let paths = Arc::clone(&self.paths);

		let created = fan_out(dirs, self.workers, move |dir| create_directory(&paths, &dir)).await?;
		Ok(created.into_iter().sum())
	}

	/// Reconcile planned files concurrently
	pub async fn reconcile(
		&self,
		plan: Vec<PlannedFile>,
	) -> Result<Vec<ReconciliationRecord>, SyncError> {
		let context = Arc::clone(&self.context);
		fan_out(plan, self.workers, move |file| context.reconcile_file(file)).await
	}

	/// Plan, create directories, and reconcile a whole manifest
	pub async fn run(&self, manifest: &FileManifest) -> Result<Vec<ReconciliationRecord>, SyncError> {
		let plan = self.plan(manifest)?;
		let created = self.create_directories(manifest).await?;
		if created > 0 {
			debug!("Created {} directories", created);
		}
		self.reconcile(plan).await
	}
}

/// Create `dir` and any missing ancestor below the target root
fn create_directory(paths: &SyncPaths, dir: &Path) -> Result<usize, SyncError> {
	let mut created = 0;
	let mut relative = PathBuf::new();

	for component in dir.components() {
		relative.push(component);
		let target = paths.target_root.join(&relative);

		match fs::create_dir(&target) {
			Ok(()) => {
				created += 1;
				let source = paths.source_path(&relative);
				let perms = fs::metadata(&source).map_err(|e| SyncError::io(&source, e))?.permissions();
				fs::set_permissions(&target, perms).map_err(|e| SyncError::io(&target, e))?;
				debug!("Created directory {}", target.display());
			}
			Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
				let meta = fs::metadata(&target).map_err(|e| SyncError::io(&target, e))?;
				if !meta.is_dir() {
					return Err(SyncError::io(
						&target,
						io::Error::new(io::ErrorKind::AlreadyExists, "exists and is not a directory"),
					));
				}
			}
			Err(e) => return Err(SyncError::io(&target, e)),
		}
	}

	Ok(created)
}

impl FileContext {
	fn reconcile_file(&self, file: PlannedFile) -> Result<ReconciliationRecord, SyncError> {
		self.apply(&file).map_err(|cause| SyncError::Reconcile {
			source: file.source.clone(),
			target: file.target.clone(),
			cause: Box::new(cause),
		})
	}

	fn apply(&self, file: &PlannedFile) -> Result<ReconciliationRecord, SyncError> {
		let source_meta = fs::metadata(&file.source).map_err(|e| SyncError::io(&file.source, e))?;
		if source_meta.is_dir() {
			return Err(SyncError::IsDirectory { path: file.source.clone() });
		}
		let source_perms = source_meta.permissions();

		// Rendered output lives in the system temp dir until this file is done
		let rendered =
			if file.templated { Some(self.renderer.render(&file.source)?) } else { None };
		let content = rendered.as_ref().map_or(file.source.as_path(), |tmp| tmp.path());

		// A symlinked target is replaced, never followed
		let (target_exists, target_is_link) = match fs::symlink_metadata(&file.target) {
			Ok(meta) if meta.is_dir() => {
				return Err(SyncError::IsDirectory { path: file.target.clone() })
			}
			Ok(meta) => (true, meta.file_type().is_symlink()),
			Err(e) if e.kind() == io::ErrorKind::NotFound => (false, false),
			Err(e) => return Err(SyncError::io(&file.target, e)),
		};

		let outcome = if !target_exists {
			copy_atomic(content, &file.target, &source_perms)?;
			Outcome::Created
		} else if target_is_link {
			debug!("Replacing symlink {}", file.target.display());
			copy_atomic(content, &file.target, &source_perms)?;
			Outcome::Updated
		} else if self.comparator.equal(content, &file.target)? {
			Outcome::Unchanged
		} else {
			copy_atomic(content, &file.target, &source_perms)?;
			Outcome::Updated
		};

		let permissions_changed = align_permissions(&file.target, &source_perms)?;

		match outcome {
			Outcome::Created => info!("Created {}", file.target.display()),
			Outcome::Updated => info!("Updated {}", file.target.display()),
			Outcome::Unchanged if permissions_changed => {
				info!("Fixed permissions of {}", file.target.display())
			}
			Outcome::Unchanged => debug!("Unchanged {}", file.target.display()),
		}

		Ok(ReconciliationRecord {
			source: file.relative.clone(),
			target: file.target.clone(),
			templated: file.templated,
			outcome,
			permissions_changed,
		})
	}
}

/// Copy `from` over `to` through a temporary file in the target directory
fn copy_atomic(from: &Path, to: &Path, perms: &Permissions) -> Result<(), SyncError> {
	let dir = to.parent().ok_or_else(|| {
		SyncError::io(to, io::Error::new(io::ErrorKind::InvalidInput, "target has no parent"))
	})?;

	let mut reader = File::open(from).map_err(|e| SyncError::io(from, e))?;
	let mut tmp = tempfile::Builder::new()
		.prefix(".beamsync-")
		.tempfile_in(dir)
		.map_err(|e| SyncError::io(dir, e))?;

	io::copy(&mut reader, tmp.as_file_mut()).map_err(|e| SyncError::io(from, e))?;
	tmp.as_file().set_permissions(perms.clone()).map_err(|e| SyncError::io(tmp.path(), e))?;
	tmp.as_file().sync_all().map_err(|e| SyncError::io(tmp.path(), e))?;
	tmp.persist(to).map_err(|e| SyncError::io(to, e.error))?;
	Ok(())
}

/// Set the target's permission bits to the source's; true if they changed
fn align_permissions(target: &Path, source_perms: &Permissions) -> Result<bool, SyncError> {
	let current = fs::metadata(target).map_err(|e| SyncError::io(target, e))?.permissions();
	if permission_bits(&current) == permission_bits(source_perms) {
		return Ok(false);
	}

	fs::set_permissions(target, source_perms.clone()).map_err(|e| SyncError::io(target, e))?;
	Ok(true)
}

#[cfg(unix)]
fn permission_bits(perms: &Permissions) -> u32 {
	use std::os::unix::fs::PermissionsExt;
	perms.mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(perms: &Permissions) -> u32 {
	perms.readonly() as u32
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::comparator::comparator_for;
	use crate::strategies::ComparatorKind;
	use tempfile::TempDir;

	struct Fixture {
		_dir: TempDir,
		source: PathBuf,
		target: PathBuf,
		reconciler: Reconciler,
	}

	fn fixture(templates: &[&str]) -> Fixture {
		let dir = TempDir::new().unwrap();
		let source = dir.path().join("src");
		let target = dir.path().join("dst");
		fs::create_dir_all(&source).unwrap();
		fs::create_dir_all(&target).unwrap();

		let mut vars = BTreeMap::new();
		vars.insert("NAME".to_string(), "world".to_string());

		let paths = Arc::new(SyncPaths::new(source.clone(), PathBuf::new(), target.clone()));
		let reconciler = Reconciler::new(
			paths,
			TemplateExtensions::new(templates),
			comparator_for(ComparatorKind::Xxh3),
			Arc::new(TemplateRenderer::with_env(vars)),
			4,
		);
		Fixture { _dir: dir, source, target, reconciler }
	}

	fn manifest(paths: &[&str]) -> FileManifest {
		paths.iter().map(PathBuf::from).collect()
	}

	#[tokio::test]
	async fn test_create_update_unchanged() {
		let fx = fixture(&[]);
		fs::create_dir_all(fx.source.join("sub")).unwrap();
		fs::write(fx.source.join("new.txt"), "new").unwrap();
		fs::write(fx.source.join("sub/changed.txt"), "v2").unwrap();
		fs::write(fx.source.join("same.txt"), "same").unwrap();
		fs::create_dir_all(fx.target.join("sub")).unwrap();
		fs::write(fx.target.join("sub/changed.txt"), "v1").unwrap();
		fs::write(fx.target.join("same.txt"), "same").unwrap();

		let records = fx
			.reconciler
			.run(&manifest(&["new.txt", "same.txt", "sub/changed.txt"]))
			.await
			.unwrap();

		let outcomes: Vec<_> = records.iter().map(|r| r.outcome).collect();
		assert_eq!(outcomes, vec![Outcome::Created, Outcome::Unchanged, Outcome::Updated]);
		assert_eq!(fs::read_to_string(fx.target.join("new.txt")).unwrap(), "new");
		assert_eq!(fs::read_to_string(fx.target.join("sub/changed.txt")).unwrap(), "v2");
	}

	#[tokio::test]
	async fn test_template_is_rendered_and_renamed() {
		let fx = fixture(&["tmpl"]);
		fs::write(fx.source.join("hello.txt.tmpl"), "hello {{ env.NAME }}").unwrap();

		let records = fx.reconciler.run(&manifest(&["hello.txt.tmpl"])).await.unwrap();

		assert!(records[0].templated);
		assert_eq!(records[0].target, fx.target.join("hello.txt"));
		assert_eq!(fs::read_to_string(fx.target.join("hello.txt")).unwrap(), "hello world");
		assert!(!fx.target.join("hello.txt.tmpl").exists());

		// identical render on the next pass is a no-op
		let records = fx.reconciler.run(&manifest(&["hello.txt.tmpl"])).await.unwrap();
		assert_eq!(records[0].outcome, Outcome::Unchanged);
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_symlinked_target_is_replaced_not_followed() {
		use std::os::unix::fs::{symlink, PermissionsExt};

		let fx = fixture(&[]);
		let outside = fx._dir.path().join("outside.txt");
		fs::write(&outside, "same").unwrap();
		fs::set_permissions(&outside, Permissions::from_mode(0o600)).unwrap();
		fs::write(fx.source.join("link.txt"), "same").unwrap();
		fs::set_permissions(fx.source.join("link.txt"), Permissions::from_mode(0o644)).unwrap();
		symlink(&outside, fx.target.join("link.txt")).unwrap();

		let records = fx.reconciler.run(&manifest(&["link.txt"])).await.unwrap();

		assert_eq!(records[0].outcome, Outcome::Updated);
		let meta = fs::symlink_metadata(fx.target.join("link.txt")).unwrap();
		assert!(meta.file_type().is_file());
		assert_eq!(meta.permissions().mode() & 0o777, 0o644);
		assert_eq!(fs::metadata(&outside).unwrap().permissions().mode() & 0o777, 0o600);
	}

	#[tokio::test]
	async fn test_collision_is_rejected_before_writing() {
		let fx = fixture(&[".tmpl"]);
		fs::write(fx.source.join("a.yaml"), "plain").unwrap();
		fs::write(fx.source.join("a.yaml.tmpl"), "templated").unwrap();

		let err = fx.reconciler.run(&manifest(&["a.yaml", "a.yaml.tmpl"])).await.unwrap_err();
		assert!(matches!(err, SyncError::TargetCollision { .. }));
		assert!(!fx.target.join("a.yaml").exists());
	}

	#[tokio::test]
	async fn test_directory_at_target_is_fatal() {
		let fx = fixture(&[]);
		fs::write(fx.source.join("clash"), "file").unwrap();
		fs::create_dir_all(fx.target.join("clash")).unwrap();

		let err = fx.reconciler.run(&manifest(&["clash"])).await.unwrap_err();
		match err {
			SyncError::Reconcile { source, target, cause } => {
				assert_eq!(source, fx.source.join("clash"));
				assert_eq!(target, fx.target.join("clash"));
				assert!(matches!(*cause, SyncError::IsDirectory { .. }));
			}
			other => panic!("unexpected error: {}", other),
		}
	}

	#[tokio::test]
	async fn test_file_in_place_of_directory_is_fatal() {
		let fx = fixture(&[]);
		fs::create_dir_all(fx.source.join("d")).unwrap();
		fs::write(fx.source.join("d/f"), "x").unwrap();
		fs::write(fx.target.join("d"), "not a dir").unwrap();

		let err = fx.reconciler.create_directories(&manifest(&["d/f"])).await.unwrap_err();
		assert!(err.to_string().contains("not a directory"));
	}

	#[cfg(unix)]
	#[tokio::test]
	async fn test_permissions_follow_source() {
		use std::os::unix::fs::PermissionsExt;

		let fx = fixture(&[]);
		fs::create_dir_all(fx.source.join("bin")).unwrap();
		fs::set_permissions(fx.source.join("bin"), Permissions::from_mode(0o750)).unwrap();
		fs::write(fx.source.join("bin/run.sh"), "#!/bin/sh\n").unwrap();
		fs::set_permissions(fx.source.join("bin/run.sh"), Permissions::from_mode(0o755)).unwrap();

		let records = fx.reconciler.run(&manifest(&["bin/run.sh"])).await.unwrap();
		assert_eq!(records[0].outcome, Outcome::Created);
		assert!(!records[0].permissions_changed);

		let mode = |p: &Path| fs::metadata(p).unwrap().permissions().mode() & 0o7777;
		assert_eq!(mode(&fx.target.join("bin")), 0o750);
		assert_eq!(mode(&fx.target.join("bin/run.sh")), 0o755);

		// content already identical: only the mode is fixed
		fs::set_permissions(fx.target.join("bin/run.sh"), Permissions::from_mode(0o644)).unwrap();
		let records = fx.reconciler.run(&manifest(&["bin/run.sh"])).await.unwrap();
		assert_eq!(records[0].outcome, Outcome::Unchanged);
		assert!(records[0].permissions_changed);
		assert_eq!(mode(&fx.target.join("bin/run.sh")), 0o755);
	}

	#[tokio::test]
	async fn test_no_temporary_files_left() {
		let fx = fixture(&[]);
		for i in 0..20 {
			fs::write(fx.source.join(format!("f{}.txt", i)), format!("{}", i)).unwrap();
		}
		let names: Vec<String> = (0..20).map(|i| format!("f{}.txt", i)).collect();
		let manifest: FileManifest = names.iter().map(PathBuf::from).collect();

		fx.reconciler.run(&manifest).await.unwrap();

		let leftovers = fs::read_dir(&fx.target)
			.unwrap()
			.filter_map(Result::ok)
			.filter(|e| e.file_name().to_string_lossy().starts_with(".beamsync-"))
			.count();
		assert_eq!(leftovers, 0);
		assert_eq!(fs::read_dir(&fx.target).unwrap().count(), 20);
	}
}

// vim: ts=4
