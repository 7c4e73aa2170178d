//! Signal handlers for graceful termination
//!
//! The first SIGINT or SIGTERM asks the daemon to stop after the current run.
//! A second one exits immediately; a run interrupted that way releases its
//! lock but never commits state.

use crate::logging::*;
use tokio::sync::watch;

/// Channel carrying the shutdown request; `true` means stop
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
	watch::channel(false)
}

/// Spawn the signal listener
#[cfg(unix)]
pub fn setup_signal_handlers(shutdown: watch::Sender<bool>) {
	tokio::spawn(async move {
		use tokio::signal::unix::{signal, SignalKind};

		let mut sigterm = match signal(SignalKind::terminate()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGTERM handler: {}. Process will not handle SIGTERM gracefully.", e);
				return;
			}
		};

		let mut sigint = match signal(SignalKind::interrupt()) {
			Ok(stream) => stream,
			Err(e) => {
				warn!("Failed to setup SIGINT handler: {}. Process will not handle SIGINT gracefully.", e);
				return;
			}
		};

		loop {
			let code = tokio::select! {
				_ = sigterm.recv() => 143, // 128 + SIGTERM(15)
				_ = sigint.recv() => 130, // 128 + SIGINT(2)
			};

			if *shutdown.borrow() {
				warn!("Second termination signal, exiting now");
				std::process::exit(code);
			}
			info!("Termination signal received, stopping after the current run");
			let _ = shutdown.send(true);
		}
	});
}

#[cfg(not(unix))]
pub fn setup_signal_handlers(shutdown: watch::Sender<bool>) {
	tokio::spawn(async move {
		loop {
			if let Err(e) = tokio::signal::ctrl_c().await {
				warn!("Failed to listen for Ctrl-C: {}", e);
				return;
			}
			if *shutdown.borrow() {
				std::process::exit(130);
			}
			info!("Ctrl-C received, stopping after the current run");
			let _ = shutdown.send(true);
		}
	});
}

// vim: ts=4
