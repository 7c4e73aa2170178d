//! # beamsync - One-way content synchronization daemon
//!
//! beamsync pulls a revision-controlled source tree through an adapter (git)
//! and reconciles it onto a target directory: new and changed files are
//! written atomically, permissions follow the source, template files are
//! rendered, and files removed upstream are deleted from the target. Runs are
//! idempotent and guarded by a lock file in the target directory.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use beamsync::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.target_directory = "/srv/www".into();
//!     config.git.repository = "https://example.com/site.git".into();
//!     config.once = true;
//!
//!     let (_tx, rx) = beamsync::signal::shutdown_channel();
//!     Daemon::from_config(config)?.run(rx).await?;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod comparator;
pub mod config;
pub mod daemon;
pub mod delete;
pub mod error;
pub mod exclusion;
pub mod lock;
pub mod logging;
pub mod paths;
pub mod pool;
pub mod reconcile;
pub mod signal;
pub mod state;
pub mod strategies;
pub mod template;
pub mod walker;

// Re-export commonly used types and functions
pub use adapter::{Adapter, FinalizeReport, FinalizeStage, SyncOutcome};
pub use config::Config;
pub use daemon::{Daemon, RunContext, RunOutcome, RunReport};
pub use error::{AdapterError, ExclusionError, StateError, SyncError};
pub use state::{DirtyFlag, RevisionMarker, SyncState};

// vim: ts=4
