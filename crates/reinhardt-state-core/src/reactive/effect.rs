//! Effect - Reactive Side Effects
//!
//! An effect is a closure that runs once immediately and again whenever a
//! [`State`](super::State) key it read during its last run changes.
//! Dependencies are recorded afresh on every run, so keys read only on a
//! branch that is no longer taken stop waking the effect.
//!
//! ## Example
//!
//! ```ignore
//! use reinhardt_state_core::reactive::{effect, state};
//!
//! let count = state(serde_json::json!({"count": 0}));
//!
//! let count_clone = count.clone();
//! let handle = effect(move || {
//!     println!("Count is: {:?}", count_clone.get("count"));
//! });
//!
//! count.set("count", 42); // Prints: "Count is: Number(42.0)"
//! handle.dispose();
//! count.set("count", 43); // Prints nothing
//! ```

use core::cell::RefCell;
use core::fmt;
use std::rc::Rc;

use crate::error::BoxError;

use super::runtime::{Job, RunFn, Runtime, SubscriberId, SubscriberKind};

/// Handle to a registered effect, watcher, computed property or binding
///
/// Dropping the handle does **not** stop the subscription; call
/// [`dispose`](Self::dispose) for that. This lets fire-and-forget effects live
/// as long as their runtime.
#[derive(Clone)]
pub struct EffectHandle {
	runtime: Runtime,
	id: SubscriberId,
}

impl EffectHandle {
	pub(crate) fn new(runtime: Runtime, id: SubscriberId) -> Self {
		Self { runtime, id }
	}

	/// Subscriber ID of this effect
	pub fn id(&self) -> SubscriberId {
		self.id
	}

	/// Stop future runs and release all dependencies
	///
	/// Disposing twice is a no-op. A run already in progress is not interrupted.
	pub fn dispose(&self) {
		self.runtime.dispose(self.id);
	}

	/// Whether [`dispose`](Self::dispose) has been called
	pub fn is_disposed(&self) -> bool {
		!self.runtime.is_registered(self.id)
	}

	/// Turn the handle into a disposer closure, e.g. for a
	/// [`CleanupCollector`](crate::cleanup::CleanupCollector)
	pub fn into_disposer(self) -> impl FnOnce() + 'static {
		move || self.dispose()
	}
}

impl fmt::Debug for EffectHandle {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EffectHandle")
			.field("id", &self.id)
			.field("disposed", &self.is_disposed())
			.finish()
	}
}

impl Runtime {
	/// Register an effect and run it immediately
	pub fn effect<F>(&self, mut f: F) -> EffectHandle
	where
		F: FnMut() + 'static,
	{
		self.try_effect(move || {
			f();
			Ok(())
		})
	}

	/// Register a fallible effect and run it immediately
	///
	/// An `Err` is reported through [`on_error`](Self::on_error); the effect
	/// stays registered and runs again on the next change.
	pub fn try_effect<F>(&self, f: F) -> EffectHandle
	where
		F: FnMut() -> Result<(), BoxError> + 'static,
	{
		self.spawn(SubscriberKind::Effect, f)
	}

	pub(crate) fn spawn<F>(&self, kind: SubscriberKind, f: F) -> EffectHandle
	where
		F: FnMut() -> Result<(), BoxError> + 'static,
	{
		let run: RunFn = Rc::new(RefCell::new(f));
		let id = self.register(kind, Job::Run(run));
		self.run_initial(id);
		EffectHandle::new(self.clone(), id)
	}
}

/// Register an effect on the thread's default runtime
pub fn effect<F>(f: F) -> EffectHandle
where
	F: FnMut() + 'static,
{
	Runtime::current().effect(f)
}

/// Register a fallible effect on the thread's default runtime
pub fn try_effect<F>(f: F) -> EffectHandle
where
	F: FnMut() -> Result<(), BoxError> + 'static,
{
	Runtime::current().try_effect(f)
}
