//! Bounded fan-out over blocking work
//!
//! A fixed number of workers run on tokio's blocking pool and pull items from
//! a shared queue. The first failure wins: it is kept in a shared slot, workers
//! stop taking new items once it is set, and the barrier returns it after all
//! in-flight items have finished.

use crate::error::SyncError;
use futures::future::join_all;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Holds the first error reported by any worker
#[derive(Default)]
pub struct ErrorSlot {
	failed: AtomicBool,
	error: Mutex<Option<SyncError>>,
}

impl ErrorSlot {
	/// Record an error unless one is already stored
	pub fn set(&self, error: SyncError) {
		let mut slot = lock(&self.error);
		if slot.is_none() {
			*slot = Some(error);
			self.failed.store(true, Ordering::SeqCst);
		}
	}

	pub fn is_set(&self) -> bool {
		self.failed.load(Ordering::SeqCst)
	}

	pub fn take(&self) -> Option<SyncError> {
		lock(&self.error).take()
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	// A panicking worker is reported through its JoinError; the data is still usable
	mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run `task` over `items` with at most `workers` concurrent workers
///
/// Results come back in input order. On failure the first stored error is
/// returned and items not yet started are dropped.
pub async fn fan_out<T, R, F>(items: Vec<T>, workers: usize, task: F) -> Result<Vec<R>, SyncError>
where
	T: Send + 'static,
	R: Send + 'static,
	F: Fn(T) -> Result<R, SyncError> + Send + Sync + 'static,
{
	if items.is_empty() {
		return Ok(Vec::new());
	}

	let workers = workers.max(1).min(items.len());
	let queue: Arc<Mutex<VecDeque<(usize, T)>>> =
		Arc::new(Mutex::new(items.into_iter().enumerate().collect()));
	let slot = Arc::new(ErrorSlot::default());
	let task = Arc::new(task);

	let handles: Vec<_> = (0..workers)
		.map(|_| {
			let queue = Arc::clone(&queue);
			let slot = Arc::clone(&slot);
			let task = Arc::clone(&task);

			tokio::task::spawn_blocking(move || {
				let mut done = Vec::new();
				while !slot.is_set() {
					let next = lock(&queue).pop_front();
					let (index, item) = match next {
						Some(entry) => entry,
						None => break,
					};
					match task(item) {
						Ok(result) => done.push((index, result)),
						Err(e) => {
							slot.set(e);
							break;
						}
					}
				}
				done
			})
		})
		.collect();

	let mut results = Vec::new();
	for joined in join_all(handles).await {
		match joined {
			Ok(done) => results.extend(done),
			Err(e) => slot.set(SyncError::TaskFailed { message: e.to_string() }),
		}
	}

	if let Some(error) = slot.take() {
		return Err(error);
	}

	results.sort_by_key(|(index, _)| *index);
	Ok(results.into_iter().map(|(_, result)| result).collect())
}


// vim: ts=4
