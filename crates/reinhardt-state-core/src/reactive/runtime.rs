//! Reactive Runtime
//!
//! This module provides the runtime that owns the subscriber registry, the
//! observer stack used for dependency tracking, and the pending-update queue.
//!
//! ## Architecture
//!
//! 1. **Observer Stack**: Tracks the subscriber currently executing. Reading a
//!    [`State`](super::State) key while an observer is current records the
//!    subscriber against that key.
//! 2. **Subscriber Registry**: Maps a [`SubscriberId`] to its kind, its body
//!    and the `(object, key)` sources it touched during its last run. Sources
//!    are cleared before every re-run, so dependencies always reflect the
//!    latest execution.
//! 3. **Update Scheduling**: Notified subscribers are queued in priority tiers
//!    (computed, watch, effect) and flushed either at the end of the write
//!    ([`FlushMode::Sync`]) or from a host microtask ([`FlushMode::Deferred`]).
//!
//! The runtime is an explicit handle. Every thread also has a default runtime,
//! reachable through [`with_runtime`] and [`Runtime::current`], which backs the
//! free functions of the [`reactive`](super) module.
//!
//! ## Example
//!
//! ```ignore
//! use reinhardt_state_core::reactive::{Runtime, Value};
//!
//! let rt = Runtime::new();
//! let counter = rt.state(serde_json::json!({"count": 0}));
//!
//! let counter_clone = counter.clone();
//! let _effect = rt.effect(move || {
//!     println!("count = {:?}", counter_clone.get("count"));
//! });
//!
//! counter.set("count", 1); // prints "count = Number(1.0)"
//! ```

use core::cell::{Cell, RefCell};
use core::fmt;
use std::any::Any;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use crate::config::{FlushMode, RuntimeConfig};
use crate::error::{BoxError, StateError};
use crate::logging;

use super::scheduler::Scheduler;
use super::state::StateInner;

/// Unique identifier of a subscriber (effect, watcher or computed property)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
	/// Raw numeric identifier
	pub fn as_u64(self) -> u64 {
		self.0
	}
}

impl fmt::Display for SubscriberId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Kind of subscriber. Also decides the priority tier it is flushed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriberKind {
	/// Computed property; never re-run as an ordinary effect
	Computed,
	/// Watcher comparing old and new values
	Watch,
	/// Plain side effect
	Effect,
}

impl SubscriberKind {
	/// Index of the flush tier, lower runs first
	pub(crate) fn tier(self) -> usize {
		match self {
			Self::Computed => 0,
			Self::Watch => 1,
			Self::Effect => 2,
		}
	}
}

impl fmt::Display for SubscriberKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Computed => "computed",
			Self::Watch => "watch",
			Self::Effect => "effect",
		})
	}
}

/// Re-runnable subscriber body
pub(crate) type RunFn = Rc<RefCell<dyn FnMut() -> Result<(), BoxError>>>;

type ErrorHandler = Rc<dyn Fn(&StateError)>;
type MicrotaskHook = Rc<dyn Fn(Box<dyn FnOnce()>)>;

/// What executing a subscriber means
#[derive(Clone)]
pub(crate) enum Job {
	/// Run the body under tracking
	Run(RunFn),
	/// Re-queue the ordinary readers of a computed key
	Computed {
		owner: Weak<StateInner>,
		key: String,
	},
}

/// An `(object, key)` pair a subscriber read during its last run
pub(crate) struct Source {
	state: Weak<StateInner>,
	key: String,
}

/// Registry entry of a subscriber
pub(crate) struct SubscriberEntry {
	kind: SubscriberKind,
	job: Job,
	sources: Vec<Source>,
}

pub(crate) struct RuntimeInner {
	config: RefCell<RuntimeConfig>,
	/// `None` frames come from `untrack` and suspend tracking
	observer_stack: RefCell<Vec<Option<SubscriberId>>>,
	subscribers: RefCell<BTreeMap<SubscriberId, SubscriberEntry>>,
	pub(crate) scheduler: Scheduler,
	error_handlers: RefCell<Vec<ErrorHandler>>,
	microtask: RefCell<Option<MicrotaskHook>>,
	next_id: Cell<u64>,
}

/// Handle to a reactive runtime
///
/// Cloning the handle is cheap; all clones share the same registry and queue.
#[derive(Clone)]
pub struct Runtime {
	pub(crate) inner: Rc<RuntimeInner>,
}

/// Weak handle to a runtime, used by subscriber bodies that need the runtime
/// without keeping it alive.
#[derive(Clone)]
pub struct WeakRuntime {
	inner: Weak<RuntimeInner>,
}

impl WeakRuntime {
	/// Upgrade to a strong handle if the runtime still exists
	pub fn upgrade(&self) -> Option<Runtime> {
		self.inner.upgrade().map(|inner| Runtime { inner })
	}
}

/// Pops the observer frame pushed by [`Runtime::push_observer`], also on unwind
pub(crate) struct ObserverGuard<'a> {
	runtime: &'a Runtime,
}

impl Drop for ObserverGuard<'_> {
	fn drop(&mut self) {
		self.runtime.inner.observer_stack.borrow_mut().pop();
	}
}

impl Runtime {
	/// Create a new runtime with default settings
	pub fn new() -> Self {
		Self::with_config(RuntimeConfig::default())
	}

	/// Create a new runtime with the given settings
	pub fn with_config(config: RuntimeConfig) -> Self {
		Self {
			inner: Rc::new(RuntimeInner {
				config: RefCell::new(config),
				observer_stack: RefCell::new(Vec::new()),
				subscribers: RefCell::new(BTreeMap::new()),
				scheduler: Scheduler::default(),
				error_handlers: RefCell::new(Vec::new()),
				microtask: RefCell::new(None),
				next_id: Cell::new(1),
			}),
		}
	}

	/// The default runtime of the current thread
	pub fn current() -> Self {
		with_runtime(Runtime::clone)
	}

	/// Weak handle to this runtime
	pub fn downgrade(&self) -> WeakRuntime {
		WeakRuntime {
			inner: Rc::downgrade(&self.inner),
		}
	}

	/// Whether two handles point to the same runtime
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	/// Current settings
	pub fn config(&self) -> RuntimeConfig {
		self.inner.config.borrow().clone()
	}

	/// Replace the settings. Takes effect on the next write.
	pub fn set_config(&self, config: RuntimeConfig) {
		*self.inner.config.borrow_mut() = config;
	}

	pub(crate) fn flush_mode(&self) -> FlushMode {
		self.inner.config.borrow().flush_mode
	}

	pub(crate) fn next_id(&self) -> u64 {
		let id = self.inner.next_id.get();
		self.inner.next_id.set(id + 1);
		id
	}

	/// Install the hook used to defer flushes in [`FlushMode::Deferred`].
	///
	/// In a browser this is typically `queueMicrotask` or
	/// `wasm_bindgen_futures::spawn_local`.
	///
	/// ```ignore
	/// runtime.set_microtask_scheduler(|task| {
	///     wasm_bindgen_futures::spawn_local(async move { task() });
	/// });
	/// ```
	pub fn set_microtask_scheduler<F>(&self, hook: F)
	where
		F: Fn(Box<dyn FnOnce()>) + 'static,
	{
		*self.inner.microtask.borrow_mut() = Some(Rc::new(hook));
	}

	pub(crate) fn microtask_hook(&self) -> Option<Rc<dyn Fn(Box<dyn FnOnce()>)>> {
		self.inner.microtask.borrow().clone()
	}

	/// Register a handler receiving every failure the runtime absorbs
	///
	/// Subscriber failures and cycle-limit aborts never propagate to the writer
	/// that caused them; they are logged and delivered here instead.
	pub fn on_error<F>(&self, handler: F)
	where
		F: Fn(&StateError) + 'static,
	{
		self.inner.error_handlers.borrow_mut().push(Rc::new(handler));
	}

	/// Log an absorbed failure and hand it to the error handlers
	pub(crate) fn report(&self, error: StateError) {
		tracing::error!(target: logging::REACTIVE, error = %error, "reactive failure absorbed");
		let handlers: Vec<ErrorHandler> = self.inner.error_handlers.borrow().clone();
		for handler in handlers {
			handler(&error);
		}
	}

	/// Get the current observer (the subscriber whose reads are being tracked)
	pub fn current_observer(&self) -> Option<SubscriberId> {
		self.inner.observer_stack.borrow().last().copied().flatten()
	}

	/// Whether reads are currently recorded as dependencies
	pub fn is_tracking(&self) -> bool {
		self.current_observer().is_some()
	}

	/// Push an observer frame; `None` suspends tracking until the guard drops
	pub(crate) fn push_observer(&self, observer: Option<SubscriberId>) -> ObserverGuard<'_> {
		self.inner.observer_stack.borrow_mut().push(observer);
		ObserverGuard { runtime: self }
	}

	/// Run `f` without recording any dependency
	pub fn untrack<R>(&self, f: impl FnOnce() -> R) -> R {
		let _frame = self.push_observer(None);
		f()
	}

	/// Track a dependency between the current observer and `key` of `state`
	///
	/// This is called automatically by [`State::get`](super::State::get).
	pub(crate) fn track(&self, state: &Rc<StateInner>, key: &str) {
		let Some(observer) = self.current_observer() else {
			return;
		};

		{
			let mut subscribers = self.inner.subscribers.borrow_mut();
			let Some(entry) = subscribers.get_mut(&observer) else {
				return;
			};
			let weak = Rc::downgrade(state);
			let known = entry
				.sources
				.iter()
				.any(|source| source.key == key && Weak::ptr_eq(&source.state, &weak));
			if !known {
				entry.sources.push(Source {
					state: weak,
					key: key.to_string(),
				});
			}
		}

		state.add_subscriber(key, observer);
	}

	pub(crate) fn register(&self, kind: SubscriberKind, job: Job) -> SubscriberId {
		let id = SubscriberId(self.next_id());
		self.inner.subscribers.borrow_mut().insert(
			id,
			SubscriberEntry {
				kind,
				job,
				sources: Vec::new(),
			},
		);
		tracing::trace!(target: logging::REACTIVE, subscriber = %id, %kind, "subscriber registered");
		id
	}

	/// Whether the subscriber is still registered
	pub fn is_registered(&self, id: SubscriberId) -> bool {
		self.inner.subscribers.borrow().contains_key(&id)
	}

	/// Number of live subscribers
	pub fn subscriber_count(&self) -> usize {
		self.inner.subscribers.borrow().len()
	}

	pub(crate) fn kind_of(&self, id: SubscriberId) -> Option<SubscriberKind> {
		self.inner
			.subscribers
			.borrow()
			.get(&id)
			.map(|entry| entry.kind)
	}

	fn job_of(&self, id: SubscriberId) -> Option<(SubscriberKind, Job)> {
		self.inner
			.subscribers
			.borrow()
			.get(&id)
			.map(|entry| (entry.kind, entry.job.clone()))
	}

	/// Number of `(object, key)` sources the subscriber read on its last run
	pub fn dependency_count(&self, id: SubscriberId) -> usize {
		self.inner
			.subscribers
			.borrow()
			.get(&id)
			.map(|entry| entry.sources.len())
			.unwrap_or(0)
	}

	/// Clear the dependencies recorded for a subscriber
	///
	/// Called before every re-run so stale keys stop notifying it.
	pub(crate) fn clear_dependencies(&self, id: SubscriberId) {
		let sources = {
			let mut subscribers = self.inner.subscribers.borrow_mut();
			match subscribers.get_mut(&id) {
				Some(entry) => core::mem::take(&mut entry.sources),
				None => return,
			}
		};

		for source in sources {
			if let Some(state) = source.state.upgrade() {
				state.remove_subscriber(&source.key, id);
			}
		}
	}

	/// Remove a subscriber for good
	pub(crate) fn dispose(&self, id: SubscriberId) {
		self.clear_dependencies(id);
		let removed = self.inner.subscribers.borrow_mut().remove(&id);
		self.inner.scheduler.remove(id);

		if let Some(SubscriberEntry {
			job: Job::Computed { owner, key },
			..
		}) = removed
			&& let Some(owner) = owner.upgrade()
		{
			owner.remove_computed(&key, id);
		}
		tracing::trace!(target: logging::REACTIVE, subscriber = %id, "subscriber disposed");
	}

	/// Route a change notification to the given subscribers
	///
	/// Computed subscribers are invalidated on the spot; everything else is
	/// queued. Returns the ids that are no longer registered so the caller can
	/// prune them from its dependency map.
	pub(crate) fn dispatch(&self, ids: &[SubscriberId]) -> Vec<SubscriberId> {
		let mut dead = Vec::new();
		for &id in ids {
			match self.kind_of(id) {
				None => dead.push(id),
				Some(SubscriberKind::Computed) => self.invalidate_computed(id),
				Some(kind) => {
					self.inner.scheduler.enqueue(id, kind);
				}
			}
		}
		dead
	}

	/// Mark a computed property dirty, together with every computed reading it
	///
	/// Dirtiness spreads synchronously so a read right after the write never
	/// sees a stale cache. Ordinary readers are re-queued later by the
	/// computed-tier job. Already dirty entries stop the walk, which also ends
	/// cycles between computed properties.
	pub(crate) fn invalidate_computed(&self, id: SubscriberId) {
		let Some((_, Job::Computed { owner, key })) = self.job_of(id) else {
			return;
		};
		let Some(owner) = owner.upgrade() else {
			return;
		};
		if !owner.mark_computed_dirty(&key) {
			return;
		}

		self.inner.scheduler.enqueue(id, SubscriberKind::Computed);

		for reader in owner.subscribers_of(&key) {
			if self.kind_of(reader) == Some(SubscriberKind::Computed) {
				self.invalidate_computed(reader);
			}
		}
	}

	/// Queue the ordinary readers of a computed key
	fn propagate_computed(&self, owner: &Weak<StateInner>, key: &str) {
		let Some(owner) = owner.upgrade() else {
			return;
		};
		for reader in owner.subscribers_of(key) {
			match self.kind_of(reader) {
				Some(SubscriberKind::Computed) | None => {}
				Some(kind) => {
					self.inner.scheduler.enqueue(reader, kind);
				}
			}
		}
	}

	/// Execute a subscriber by its ID
	///
	/// Failures and panics inside the body are caught here and reported; they
	/// never reach the code that triggered the run.
	pub(crate) fn execute(&self, id: SubscriberId) {
		let Some((kind, job)) = self.job_of(id) else {
			return;
		};

		let run = match job {
			Job::Computed { owner, key } => {
				self.propagate_computed(&owner, &key);
				return;
			}
			Job::Run(run) => run,
		};

		let Ok(mut body) = run.try_borrow_mut() else {
			tracing::warn!(
				target: logging::REACTIVE,
				subscriber = %id,
				"subscriber triggered itself while running, skipping nested run"
			);
			return;
		};

		self.clear_dependencies(id);
		let _running = self.inner.scheduler.enter_run();
		let outcome = {
			let _observer = self.push_observer(Some(id));
			std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (&mut *body)()))
		};
		drop(body);

		let cause = match outcome {
			Ok(Ok(())) => None,
			Ok(Err(error)) => Some(crate::error::FailureCause::Failed(error.to_string())),
			Err(payload) => Some(crate::error::FailureCause::Panicked(panic_message(
				payload.as_ref(),
			))),
		};
		if let Some(cause) = cause {
			self.report(crate::error::SubscriberError { id, kind, cause }.into());
		}
	}

	/// First run of a freshly registered subscriber, followed by a flush of
	/// whatever its body queued
	pub(crate) fn run_initial(&self, id: SubscriberId) {
		self.execute(id);
		self.request_flush();
	}
}

impl Default for Runtime {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for Runtime {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Runtime")
			.field("subscribers", &self.subscriber_count())
			.field("pending", &self.inner.scheduler.len())
			.field("batch_depth", &self.inner.scheduler.depth())
			.finish()
	}
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_string()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"non-string panic payload".to_string()
	}
}

// Thread-local runtime instance
//
// In WASM there is only one thread, so this effectively provides a global runtime.
// On native platforms each thread gets its own runtime instance.
thread_local! {
	static RUNTIME: Runtime = Runtime::new();
}

/// Run `f` with the default runtime of the current thread
///
/// # Example
///
/// ```ignore
/// use reinhardt_state_core::reactive::with_runtime;
///
/// with_runtime(|rt| rt.flush()).unwrap();
/// ```
pub fn with_runtime<F, R>(f: F) -> R
where
	F: FnOnce(&Runtime) -> R,
{
	RUNTIME.with(f)
}
