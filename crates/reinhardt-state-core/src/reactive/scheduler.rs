//! Update scheduler - batching and the flush loop
//!
//! Writes never run subscribers directly. They queue them here, in three
//! priority tiers, and the queue is drained by [`Runtime::flush`]:
//!
//! 1. computed properties, so derived values are settled first
//! 2. watchers
//! 3. effects
//!
//! A subscriber is queued at most once until it runs, so any number of writes
//! inside a [`batch`](Runtime::batch) collapse into a single run per subscriber.

use core::cell::{Cell, RefCell};

use crate::config::FlushMode;
use crate::error::SchedulerError;
use crate::logging;

use super::runtime::{Runtime, SubscriberId, SubscriberKind};

const TIERS: usize = 3;

/// Pending-update queue and batching counters of a runtime
#[derive(Default)]
pub(crate) struct Scheduler {
	/// Nesting depth of batch/pause; flushes wait while positive
	depth: Cell<usize>,
	flushing: Cell<bool>,
	/// Subscriber bodies currently executing
	running: Cell<usize>,
	/// A deferred flush is already waiting in the host's microtask queue
	scheduled: Cell<bool>,
	tiers: RefCell<[Vec<SubscriberId>; TIERS]>,
}

/// Marks a subscriber body as running for the lifetime of the guard
pub(crate) struct RunGuard<'a> {
	scheduler: &'a Scheduler,
}

impl Drop for RunGuard<'_> {
	fn drop(&mut self) {
		self.scheduler.running.set(self.scheduler.running.get() - 1);
	}
}

struct FlushGuard<'a> {
	scheduler: &'a Scheduler,
}

impl Drop for FlushGuard<'_> {
	fn drop(&mut self) {
		self.scheduler.flushing.set(false);
	}
}

impl Scheduler {
	/// Queue a subscriber in the tier of its kind; returns false if it was
	/// already waiting
	pub(crate) fn enqueue(&self, id: SubscriberId, kind: SubscriberKind) -> bool {
		let mut tiers = self.tiers.borrow_mut();
		let tier = &mut tiers[kind.tier()];
		if tier.contains(&id) {
			return false;
		}
		tier.push(id);
		true
	}

	pub(crate) fn contains(&self, id: SubscriberId) -> bool {
		self.tiers.borrow().iter().any(|tier| tier.contains(&id))
	}

	pub(crate) fn remove(&self, id: SubscriberId) {
		for tier in self.tiers.borrow_mut().iter_mut() {
			tier.retain(|queued| *queued != id);
		}
	}

	fn take_tier(&self, tier: usize) -> Vec<SubscriberId> {
		core::mem::take(&mut self.tiers.borrow_mut()[tier])
	}

	pub(crate) fn len(&self) -> usize {
		self.tiers.borrow().iter().map(Vec::len).sum()
	}

	pub(crate) fn is_empty(&self) -> bool {
		self.tiers.borrow().iter().all(Vec::is_empty)
	}

	/// Drop everything queued; returns how many entries were discarded
	fn clear(&self) -> usize {
		let mut tiers = self.tiers.borrow_mut();
		let dropped = tiers.iter().map(Vec::len).sum();
		for tier in tiers.iter_mut() {
			tier.clear();
		}
		dropped
	}

	pub(crate) fn depth(&self) -> usize {
		self.depth.get()
	}

	pub(crate) fn enter_run(&self) -> RunGuard<'_> {
		self.running.set(self.running.get() + 1);
		RunGuard { scheduler: self }
	}

	fn begin_flush(&self) -> Option<FlushGuard<'_>> {
		if self.flushing.replace(true) {
			return None;
		}
		Some(FlushGuard { scheduler: self })
	}
}

/// Ends a batch when dropped, also when the batched closure panics
pub struct BatchGuard {
	runtime: Runtime,
	flush: bool,
}

impl BatchGuard {
	/// Leave the batch without flushing; queued updates wait for the next flush
	pub fn skip_flush(mut self) {
		self.flush = false;
	}
}

impl Drop for BatchGuard {
	fn drop(&mut self) {
		self.runtime.resume(self.flush);
	}
}

impl Runtime {
	/// Suspend flushing until the matching [`resume`](Self::resume)
	///
	/// Calls nest; only the outermost `resume` can flush.
	pub fn pause(&self) {
		let scheduler = &self.inner.scheduler;
		scheduler.depth.set(scheduler.depth.get() + 1);
	}

	/// Undo one [`pause`](Self::pause); when the outermost pause ends and
	/// `flush` is set, pending updates run according to the flush mode
	///
	/// A `resume` without a matching `pause` is ignored.
	pub fn resume(&self, flush: bool) {
		let scheduler = &self.inner.scheduler;
		let depth = scheduler.depth.get();
		if depth == 0 {
			tracing::warn!(target: logging::SCHEDULER, "resume called without a matching pause");
			return;
		}
		scheduler.depth.set(depth - 1);
		if depth == 1 && flush {
			self.request_flush();
		}
	}

	/// Begin a batch that ends when the returned guard is dropped
	pub fn batch_guard(&self) -> BatchGuard {
		self.pause();
		BatchGuard {
			runtime: self.clone(),
			flush: true,
		}
	}

	/// Run `f` with flushing suspended, then flush once
	///
	/// Every subscriber affected by the writes inside `f` runs at most once,
	/// after `f` returns.
	///
	/// # Example
	///
	/// ```ignore
	/// rt.batch(|| {
	///     state.set("first", "Ada");
	///     state.set("last", "Lovelace");
	/// }); // effects reading both keys run once here
	/// ```
	pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
		let _guard = self.batch_guard();
		f()
	}

	/// Whether a batch or pause is in progress
	pub fn is_batching(&self) -> bool {
		self.inner.scheduler.depth() > 0
	}

	/// Whether a flush or a subscriber body is executing right now
	pub(crate) fn is_busy(&self) -> bool {
		let scheduler = &self.inner.scheduler;
		scheduler.flushing.get() || scheduler.running.get() > 0
	}

	/// Whether `id` is waiting in the queue
	pub(crate) fn is_queued(&self, id: SubscriberId) -> bool {
		self.inner.scheduler.contains(id)
	}

	/// Number of subscribers waiting to run
	pub fn pending_count(&self) -> usize {
		self.inner.scheduler.len()
	}

	/// Ask for the queue to be drained according to the flush mode
	///
	/// Nothing happens while batching, while a flush is running (the running
	/// flush picks the new entries up) or inside a subscriber body (the flush
	/// around it does).
	pub(crate) fn request_flush(&self) {
		let scheduler = &self.inner.scheduler;
		if scheduler.depth() > 0 || scheduler.is_empty() {
			return;
		}

		match self.flush_mode() {
			FlushMode::Sync => {
				if scheduler.flushing.get() || scheduler.running.get() > 0 {
					return;
				}
				// Failures are already reported through `on_error`.
				let _ = self.flush();
			}
			FlushMode::Deferred => {
				if scheduler.scheduled.get() {
					return;
				}
				let Some(hook) = self.microtask_hook() else {
					tracing::trace!(
						target: logging::SCHEDULER,
						pending = scheduler.len(),
						"deferred flush waiting for an explicit flush call"
					);
					return;
				};
				scheduler.scheduled.set(true);
				let runtime = self.downgrade();
				hook(Box::new(move || {
					if let Some(runtime) = runtime.upgrade() {
						let _ = runtime.flush();
					}
				}));
			}
		}
	}

	/// Drain the pending queue
	///
	/// Runs cycles until the queue stays empty. Each cycle drains the tiers in
	/// order, so computed properties settle before watchers and watchers before
	/// effects; a subscriber queued again by a later tier runs in the next
	/// cycle. The cycle counter starts at zero on every call. When it passes
	/// the configured cap the remaining queue is dropped and
	/// [`SchedulerError::CycleLimit`] is both reported and returned.
	///
	/// Calling `flush` from inside a running flush returns `Ok(0)`.
	///
	/// Returns the number of subscriber runs.
	pub fn flush(&self) -> Result<usize, SchedulerError> {
		let scheduler = &self.inner.scheduler;
		let Some(_flushing) = scheduler.begin_flush() else {
			return Ok(0);
		};
		scheduler.scheduled.set(false);

		let max = self.config().max_flush_iterations;
		let mut cycles = 0usize;
		let mut runs = 0usize;

		while !scheduler.is_empty() {
			cycles += 1;
			if cycles > max {
				let dropped = scheduler.clear();
				let error = SchedulerError::CycleLimit {
					iterations: max,
					dropped,
				};
				self.report(error.clone().into());
				return Err(error);
			}

			for tier in 0..TIERS {
				let batch = scheduler.take_tier(tier);
				for id in batch {
					self.execute(id);
					runs += 1;
				}
			}
		}

		tracing::debug!(target: logging::SCHEDULER, cycles, runs, "flush complete");
		Ok(runs)
	}
}

/// Run `f` as a batch on the thread's default runtime
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
	Runtime::current().batch(f)
}

/// Suspend flushing on the thread's default runtime
pub fn pause() {
	Runtime::current().pause();
}

/// Resume flushing on the thread's default runtime
pub fn resume(flush: bool) {
	Runtime::current().resume(flush);
}

/// Drain the pending queue of the thread's default runtime
pub fn flush() -> Result<usize, SchedulerError> {
	Runtime::current().flush()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::RuntimeConfig;
	use rstest::rstest;
	use serde_json::json;
	use std::cell::RefCell;
	use std::rc::Rc;

	#[rstest]
	fn test_enqueue_deduplicates() {
		let rt = Runtime::new();
		let id = rt.effect(|| {}).id();
		let scheduler = Scheduler::default();

		assert!(scheduler.enqueue(id, SubscriberKind::Effect));
		assert!(!scheduler.enqueue(id, SubscriberKind::Effect));
		assert_eq!(scheduler.len(), 1);

		scheduler.remove(id);
		assert!(scheduler.is_empty());
	}

	#[rstest]
	fn test_batch_runs_effect_once() {
		let rt = Runtime::new();
		let state = rt.state(json!({"a": 0, "b": 0}));
		let runs = Rc::new(RefCell::new(0));

		let runs_clone = runs.clone();
		let state_clone = state.clone();
		let _effect = rt.effect(move || {
			let _ = state_clone.get("a");
			let _ = state_clone.get("b");
			*runs_clone.borrow_mut() += 1;
		});
		assert_eq!(*runs.borrow(), 1);

		rt.batch(|| {
			state.set("a", 1);
			state.set("b", 2);
			state.set("a", 3);
			assert_eq!(*runs.borrow(), 1);
		});

		assert_eq!(*runs.borrow(), 2);
	}

	#[rstest]
	fn test_nested_batches_flush_at_outermost() {
		let rt = Runtime::new();
		let state = rt.state(json!({"a": 0}));
		let runs = Rc::new(RefCell::new(0));

		let runs_clone = runs.clone();
		let state_clone = state.clone();
		let _effect = rt.effect(move || {
			let _ = state_clone.get("a");
			*runs_clone.borrow_mut() += 1;
		});

		rt.batch(|| {
			rt.batch(|| state.set("a", 1));
			assert_eq!(*runs.borrow(), 1);
			state.set("a", 2);
		});

		assert_eq!(*runs.borrow(), 2);
	}

	#[rstest]
	fn test_pause_resume_without_flush() {
		let rt = Runtime::new();
		let state = rt.state(json!({"a": 0}));
		let runs = Rc::new(RefCell::new(0));

		let runs_clone = runs.clone();
		let state_clone = state.clone();
		let _effect = rt.effect(move || {
			let _ = state_clone.get("a");
			*runs_clone.borrow_mut() += 1;
		});

		rt.pause();
		state.set("a", 1);
		rt.resume(false);
		assert_eq!(*runs.borrow(), 1);
		assert_eq!(rt.pending_count(), 1);

		assert_eq!(rt.flush(), Ok(1));
		assert_eq!(*runs.borrow(), 2);
	}

	#[rstest]
	fn test_unmatched_resume_is_ignored() {
		let rt = Runtime::new();
		rt.resume(true);
		assert!(!rt.is_batching());
	}

	#[rstest]
	fn test_batch_guard_ends_batch_on_panic() {
		let rt = Runtime::new();
		let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
			rt.batch(|| panic!("inside batch"));
		}));

		assert!(result.is_err());
		assert!(!rt.is_batching());
	}

	#[rstest]
	fn test_deferred_mode_waits_for_flush() {
		let rt = Runtime::with_config(RuntimeConfig::deferred());
		let state = rt.state(json!({"a": 0}));
		let seen = Rc::new(RefCell::new(Vec::new()));

		let seen_clone = seen.clone();
		let state_clone = state.clone();
		let _effect = rt.effect(move || {
			seen_clone
				.borrow_mut()
				.push(state_clone.get("a").as_i64().unwrap_or(-1));
		});

		state.set("a", 1);
		state.set("a", 2);
		assert_eq!(*seen.borrow(), vec![0]);

		rt.flush().unwrap();
		assert_eq!(*seen.borrow(), vec![0, 2]);
	}

	#[rstest]
	fn test_deferred_mode_uses_microtask_hook() {
		let rt = Runtime::with_config(RuntimeConfig::deferred());
		let tasks: Rc<RefCell<Vec<Box<dyn FnOnce()>>>> = Rc::new(RefCell::new(Vec::new()));
		let tasks_clone = tasks.clone();
		rt.set_microtask_scheduler(move |task| tasks_clone.borrow_mut().push(task));

		let state = rt.state(json!({"a": 0}));
		let runs = Rc::new(RefCell::new(0));
		let runs_clone = runs.clone();
		let state_clone = state.clone();
		let _effect = rt.effect(move || {
			let _ = state_clone.get("a");
			*runs_clone.borrow_mut() += 1;
		});

		state.set("a", 1);
		state.set("a", 2);
		assert_eq!(tasks.borrow().len(), 1);
		assert_eq!(*runs.borrow(), 1);

		let pending: Vec<_> = tasks.borrow_mut().drain(..).collect();
		for task in pending {
			task();
		}
		assert_eq!(*runs.borrow(), 2);
	}

	#[rstest]
	fn test_cycle_limit_drops_queue() {
		let rt = Runtime::with_config(RuntimeConfig::default().with_max_flush_iterations(5));
		let state = rt.state(json!({"n": 0}));
		let reported = Rc::new(RefCell::new(Vec::new()));
		let reported_clone = reported.clone();
		rt.on_error(move |err| reported_clone.borrow_mut().push(err.to_string()));

		let state_clone = state.clone();
		let _effect = rt.effect(move || {
			let n = state_clone.get("n").as_i64().unwrap_or(0);
			state_clone.set("n", n + 1);
		});

		assert_eq!(rt.pending_count(), 0);
		assert_eq!(
			*reported.borrow(),
			vec!["flush aborted after 5 cycles, 1 pending updates dropped".to_string()]
		);

		// The counter starts over on the next flush.
		state.set("n", 0);
		assert_eq!(reported.borrow().len(), 2);
	}
}
