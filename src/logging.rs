//! Logging prelude module for convenient access to tracing macros.
//!
//! ```ignore
//! use crate::logging::*;
//!
//! info!("Repository pulled: {}", marker);
//! warn!("File already absent: {}", path.display());
//! ```

pub use tracing::{debug, error, info, warn};

/// Initialize the tracing subscriber with environment filter support.
///
/// `RUST_LOG` wins when set; otherwise `default_level` (usually the
/// configured `logLevel`) is used:
///
/// ```bash
/// RUST_LOG=debug beamsync --once ...
/// RUST_LOG=beamsync::reconcile=trace,beamsync::adapter=debug beamsync ...
/// ```
pub fn init_tracing(default_level: &str) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

	// A subscriber may already be installed (tests, embedding); keep it.
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

// vim: ts=4
