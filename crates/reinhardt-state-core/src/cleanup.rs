//! Cleanup collectors
//!
//! A [`CleanupCollector`] gathers disposer closures (effect handles, event
//! listener removals, timers) and runs them together. Once cleaned up, the
//! collector is terminally disposed: new disposers are rejected.
//!
//! ## Example
//!
//! ```ignore
//! use reinhardt_state_core::cleanup::scope;
//! use reinhardt_state_core::reactive::effect;
//!
//! let teardown = scope(|collector| {
//!     collector.add_effect(effect(|| println!("mounted")));
//!     collector.add(|| println!("listener removed"));
//! });
//!
//! teardown(); // disposes the effect, then prints "listener removed"
//! ```

use core::cell::{Cell, RefCell};
use core::fmt;
use std::rc::Rc;

use crate::logging;
use crate::reactive::EffectHandle;
use crate::reactive::runtime::panic_message;

type Disposer = Box<dyn FnOnce()>;

struct CollectorInner {
	disposers: RefCell<Vec<Disposer>>,
	disposed: Cell<bool>,
}

/// Collects disposers and runs them in registration order
///
/// Clones share the same list.
#[derive(Clone)]
pub struct CleanupCollector {
	inner: Rc<CollectorInner>,
}

impl CleanupCollector {
	/// Create an empty, active collector
	pub fn new() -> Self {
		Self {
			inner: Rc::new(CollectorInner {
				disposers: RefCell::new(Vec::new()),
				disposed: Cell::new(false),
			}),
		}
	}

	/// Register a disposer
	///
	/// Returns `false`, and drops the disposer without calling it, when the
	/// collector has already been cleaned up.
	pub fn add<F>(&self, disposer: F) -> bool
	where
		F: FnOnce() + 'static,
	{
		if self.inner.disposed.get() {
			tracing::warn!(target: logging::CLEANUP, "cleanup collector already disposed, ignoring disposer");
			return false;
		}
		self.inner.disposers.borrow_mut().push(Box::new(disposer));
		true
	}

	/// Register an effect handle to be disposed
	pub fn add_effect(&self, handle: EffectHandle) -> bool {
		self.add(handle.into_disposer())
	}

	/// Run every disposer in registration order and mark the collector disposed
	///
	/// A panicking disposer is logged and does not stop the remaining ones.
	/// Calling this again is a no-op.
	pub fn cleanup(&self) {
		if self.inner.disposed.replace(true) {
			return;
		}
		let disposers = core::mem::take(&mut *self.inner.disposers.borrow_mut());
		let count = disposers.len();

		for disposer in disposers {
			if let Err(payload) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(disposer)) {
				tracing::error!(
					target: logging::CLEANUP,
					panic = %panic_message(payload.as_ref()),
					"disposer panicked"
				);
			}
		}
		tracing::debug!(target: logging::CLEANUP, count, "cleanup complete");
	}

	/// Number of pending disposers
	pub fn size(&self) -> usize {
		self.inner.disposers.borrow().len()
	}

	/// Whether [`cleanup`](Self::cleanup) has run
	pub fn disposed(&self) -> bool {
		self.inner.disposed.get()
	}
}

impl Default for CleanupCollector {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for CleanupCollector {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("CleanupCollector")
			.field("size", &self.size())
			.field("disposed", &self.disposed())
			.finish()
	}
}

/// Run `setup` with a fresh collector and return its cleanup closure
pub fn scope<F>(setup: F) -> impl FnOnce() + 'static
where
	F: FnOnce(&CleanupCollector),
{
	let collector = CleanupCollector::new();
	setup(&collector);
	move || collector.cleanup()
}
