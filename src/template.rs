//! Inline templating of source files
//!
//! A file whose final extension is one of the configured template extensions
//! is rendered before reconciliation and written to the target without that
//! extension (`config.yaml.tmpl` becomes `config.yaml`).

use crate::error::SyncError;
use minijinja::{Environment, UndefinedBehavior};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Configured template extensions, stored without the leading dot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateExtensions {
	extensions: Vec<String>,
}

impl TemplateExtensions {
	/// `tmpl` and `.tmpl` are equivalent
	pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
		let extensions = extensions
			.iter()
			.map(|e| e.as_ref().trim_start_matches('.').to_string())
			.filter(|e| !e.is_empty())
			.collect();
		Self { extensions }
	}

	/// Whether the final extension of `path` marks a template
	pub fn is_template(&self, path: &Path) -> bool {
		match path.extension().and_then(OsStr::to_str) {
			Some(ext) => self.extensions.iter().any(|e| e == ext),
			None => false,
		}
	}

	/// Path with the template extension removed, `None` for non-templates
	pub fn strip(&self, path: &Path) -> Option<PathBuf> {
		if !self.is_template(path) {
			return None;
		}
		path.file_stem().map(|stem| path.with_file_name(stem))
	}

	/// Path with the template extension removed, or unchanged
	pub fn target_name(&self, path: &Path) -> PathBuf {
		self.strip(path).unwrap_or_else(|| path.to_path_buf())
	}
}

/// Renders templates with a context fixed at startup
pub struct TemplateRenderer {
	env: Environment<'static>,
	context: BTreeMap<String, BTreeMap<String, String>>,
}

impl TemplateRenderer {
	/// Renderer whose context is a snapshot of the process environment
	pub fn from_process_env() -> Self {
		let vars = std::env::vars_os()
			.filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
			.collect();
		Self::with_env(vars)
	}

	/// Renderer with an explicit `env` map
	pub fn with_env(vars: BTreeMap<String, String>) -> Self {
		let mut env = Environment::new();
		env.set_undefined_behavior(UndefinedBehavior::Strict);
		env.set_keep_trailing_newline(true);

		let mut context = BTreeMap::new();
		context.insert("env".to_string(), vars);

		Self { env, context }
	}

	/// Render a template source into a string
	pub fn render_to_string(&self, source: &Path) -> Result<String, SyncError> {
		let bytes = std::fs::read(source).map_err(|e| SyncError::io(source, e))?;
		let text = String::from_utf8(bytes).map_err(|_| SyncError::Template {
			path: source.to_path_buf(),
			message: "template is not valid UTF-8".to_string(),
		})?;

		self.env.render_str(&text, &self.context).map_err(|e| SyncError::Template {
			path: source.to_path_buf(),
			message: e.to_string(),
		})
	}

	/// Render a template source into a temporary file in the system temp dir
	///
	/// The file is removed when the returned handle is dropped.
	pub fn render(&self, source: &Path) -> Result<NamedTempFile, SyncError> {
		let rendered = self.render_to_string(source)?;

		let mut tmp = NamedTempFile::new().map_err(|e| SyncError::io(std::env::temp_dir(), e))?;
		tmp.write_all(rendered.as_bytes()).map_err(|e| SyncError::io(tmp.path(), e))?;
		tmp.flush().map_err(|e| SyncError::io(tmp.path(), e))?;
		Ok(tmp)
	}
}


// vim: ts=4
