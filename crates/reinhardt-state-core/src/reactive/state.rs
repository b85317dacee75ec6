//! State - Observable key/value objects
//!
//! A [`State`] owns a record of [`Value`]s. Reading a key through [`State::get`]
//! while a subscriber runs records the subscriber against that key; writing a
//! key through [`State::set`] queues every subscriber recorded for it.
//!
//! ## Key Features
//!
//! - **Per-key tracking**: a subscriber reading `a` is not woken by writes to `b`.
//! - **Change detection**: assigning a value equal to the current one is a no-op.
//! - **Lazy nesting**: nested maps are wrapped the first time they are read and the
//!   wrapper replaces the raw map, so every later read returns the same [`State`].
//! - **Shared handle**: cloning a `State` clones a pointer; all clones observe the
//!   same data.
//!
//! ## Example
//!
//! ```ignore
//! use reinhardt_state_core::reactive::{effect, state};
//! use serde_json::json;
//!
//! let user = state(json!({"name": "Ada", "address": {"city": "London"}}));
//!
//! let address = user.get("address").as_state().cloned().unwrap();
//! address.set("city", "Paris");
//!
//! assert_eq!(user.snapshot(), json!({"name": "Ada", "address": {"city": "Paris"}}).into());
//! ```

use core::cell::RefCell;
use core::fmt;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::ValueError;
use crate::logging;

use super::computed::ComputedEntry;
use super::runtime::{Runtime, SubscriberId, WeakRuntime, with_runtime};
use super::value::{Map, Value};

/// Pseudo-key notified when keys are added or removed
pub(crate) const KEYS: &str = "\u{0}keys";

pub(crate) struct StateInner {
	id: u64,
	runtime: WeakRuntime,
	data: RefCell<Map>,
	deps: RefCell<HashMap<String, Vec<SubscriberId>>>,
	pub(crate) computed: RefCell<HashMap<String, ComputedEntry>>,
}

impl StateInner {
	pub(crate) fn add_subscriber(&self, key: &str, id: SubscriberId) {
		let mut deps = self.deps.borrow_mut();
		let subscribers = deps.entry(key.to_string()).or_default();
		if !subscribers.contains(&id) {
			subscribers.push(id);
		}
	}

	pub(crate) fn remove_subscriber(&self, key: &str, id: SubscriberId) {
		let mut deps = self.deps.borrow_mut();
		if let Some(subscribers) = deps.get_mut(key) {
			subscribers.retain(|existing| *existing != id);
			if subscribers.is_empty() {
				deps.remove(key);
			}
		}
	}

	pub(crate) fn subscribers_of(&self, key: &str) -> Vec<SubscriberId> {
		self.deps.borrow().get(key).cloned().unwrap_or_default()
	}

	/// Drop subscriber ids the registry no longer knows
	fn prune(&self, key: &str, dead: &[SubscriberId]) {
		if dead.is_empty() {
			return;
		}
		tracing::trace!(target: logging::REACTIVE, key, pruned = dead.len(), "pruning disposed subscribers");
		for id in dead {
			self.remove_subscriber(key, *id);
		}
	}

	/// Returns true if the entry went from clean to dirty
	pub(crate) fn mark_computed_dirty(&self, key: &str) -> bool {
		match self.computed.borrow_mut().get_mut(key) {
			Some(entry) if !entry.dirty => {
				entry.dirty = true;
				true
			}
			_ => false,
		}
	}

	pub(crate) fn install_computed(&self, key: &str, entry: ComputedEntry) -> Option<ComputedEntry> {
		self.computed.borrow_mut().insert(key.to_string(), entry)
	}

	/// Remove the computed entry of `key` if it still belongs to `id`
	pub(crate) fn remove_computed(&self, key: &str, id: SubscriberId) {
		let mut computed = self.computed.borrow_mut();
		if computed.get(key).is_some_and(|entry| entry.id == id) {
			computed.remove(key);
		}
	}

	fn is_computed(&self, key: &str) -> bool {
		self.computed.borrow().contains_key(key)
	}
}

/// An observable key/value object
///
/// `State` is a cheap handle; clones share the same data, dependency map and
/// computed properties. Equality is identity.
#[derive(Clone)]
pub struct State {
	pub(crate) inner: Rc<StateInner>,
}

impl State {
	/// Wrap a plain map in the thread's default runtime
	pub fn new(data: Map) -> Self {
		with_runtime(|rt| Self::new_in(rt, data))
	}

	/// Wrap a plain map in the given runtime
	pub fn new_in(runtime: &Runtime, data: Map) -> Self {
		Self {
			inner: Rc::new(StateInner {
				id: runtime.next_id(),
				runtime: runtime.downgrade(),
				data: RefCell::new(data),
				deps: RefCell::new(HashMap::new()),
				computed: RefCell::new(HashMap::new()),
			}),
		}
	}

	/// Identifier of this object, unique within its runtime
	pub fn id(&self) -> u64 {
		self.inner.id
	}

	/// Runtime this object belongs to, if it still exists
	pub fn runtime(&self) -> Option<Runtime> {
		self.inner.runtime.upgrade()
	}

	/// Whether two handles refer to the same object
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.inner, &other.inner)
	}

	/// Read a key, recording it as a dependency of the current subscriber
	///
	/// Missing keys read as [`Value::Null`] and are still tracked, so a later
	/// write that creates the key wakes the reader.
	pub fn get(&self, key: &str) -> Value {
		let Some(runtime) = self.runtime() else {
			return self.read_slot(key);
		};
		runtime.track(&self.inner, key);

		if self.inner.is_computed(key) {
			return self.read_computed(&runtime, key);
		}
		self.read_slot(key)
	}

	/// Read a key without recording a dependency
	pub fn get_untracked(&self, key: &str) -> Value {
		match self.runtime() {
			Some(runtime) => runtime.untrack(|| self.get(key)),
			None => self.read_slot(key),
		}
	}

	fn read_slot(&self, key: &str) -> Value {
		let mut data = self.inner.data.borrow_mut();
		let Some(slot) = data.get_mut(key) else {
			return Value::Null;
		};
		if let Value::Map(map) = slot {
			let child = Self {
				inner: Rc::new(StateInner {
					id: self
						.runtime()
						.map(|runtime| runtime.next_id())
						.unwrap_or_default(),
					runtime: self.inner.runtime.clone(),
					data: RefCell::new(core::mem::take(map)),
					deps: RefCell::new(HashMap::new()),
					computed: RefCell::new(HashMap::new()),
				}),
			};
			*slot = Value::Object(child);
		}
		slot.clone()
	}

	/// Write a key
	///
	/// Returns `false` without notifying anyone when the value equals the
	/// current one, or when the key is a computed property.
	pub fn set(&self, key: &str, value: impl Into<Value>) -> bool {
		let value = value.into();
		if self.inner.is_computed(key) {
			tracing::warn!(target: logging::REACTIVE, key, "cannot assign to a computed property");
			return false;
		}

		let added = {
			let mut data = self.inner.data.borrow_mut();
			let added = match data.get(key) {
				Some(current) if *current == value => return false,
				Some(_) => false,
				None => true,
			};
			data.insert(key.to_string(), value);
			added
		};

		tracing::trace!(target: logging::REACTIVE, state = self.inner.id, key, "state key changed");
		if let Some(runtime) = self.runtime() {
			self.notify_key(&runtime, key);
			if added {
				self.notify_key(&runtime, KEYS);
			}
			runtime.request_flush();
		}
		true
	}

	/// Write a key from its current value
	pub fn update<V>(&self, key: &str, f: impl FnOnce(&Value) -> V) -> bool
	where
		V: Into<Value>,
	{
		let current = self.get_untracked(key);
		self.set(key, f(&current))
	}

	/// Remove a key, returning its previous value
	pub fn remove(&self, key: &str) -> Option<Value> {
		let removed = self.inner.data.borrow_mut().remove(key)?;
		if let Some(runtime) = self.runtime() {
			self.notify_key(&runtime, key);
			self.notify_key(&runtime, KEYS);
			runtime.request_flush();
		}
		Some(removed)
	}

	/// Drop plain data under `key` without notifying
	pub(crate) fn take_data(&self, key: &str) -> Option<Value> {
		self.inner.data.borrow_mut().remove(key)
	}

	/// Whether the key holds data or a computed property (tracked)
	pub fn contains_key(&self, key: &str) -> bool {
		if let Some(runtime) = self.runtime() {
			runtime.track(&self.inner, key);
		}
		self.inner.data.borrow().contains_key(key) || self.inner.is_computed(key)
	}

	/// Data keys in order; tracks key additions and removals
	pub fn keys(&self) -> Vec<String> {
		self.track_keys();
		self.inner.data.borrow().keys().cloned().collect()
	}

	/// Data keys in order, without tracking
	pub fn keys_untracked(&self) -> Vec<String> {
		self.inner.data.borrow().keys().cloned().collect()
	}

	/// Whether the key holds data or a computed property, without tracking
	pub fn contains_key_untracked(&self, key: &str) -> bool {
		self.inner.data.borrow().contains_key(key) || self.inner.is_computed(key)
	}

	/// Number of data keys; tracks key additions and removals
	pub fn len(&self) -> usize {
		self.track_keys();
		self.inner.data.borrow().len()
	}

	/// Whether the object holds no data keys
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn track_keys(&self) {
		if let Some(runtime) = self.runtime() {
			runtime.track(&self.inner, KEYS);
		}
	}

	/// Deep, tracked copy of the data keys as a plain [`Value::Map`]
	///
	/// Every key of this object and of nested objects becomes a dependency of the
	/// current subscriber. Computed properties are not included.
	pub fn snapshot(&self) -> Value {
		let keys = self.keys();
		let map = keys
			.into_iter()
			.map(|key| {
				let value = self.get(&key).snapshot();
				(key, value)
			})
			.collect::<Map>();
		Value::Map(map)
	}

	/// Deep, untracked copy of the data keys as a plain [`Value::Map`]
	pub fn to_raw(&self) -> Value {
		match self.runtime() {
			Some(runtime) => runtime.untrack(|| self.snapshot()),
			None => Value::Map(
				self.inner
					.data
					.borrow()
					.iter()
					.map(|(key, value)| (key.clone(), value.to_raw()))
					.collect(),
			),
		}
	}

	/// Force subscribers to run even though nothing changed
	///
	/// With a key only that key's readers are queued; without one every reader
	/// of the object is.
	pub fn notify(&self, key: Option<&str>) {
		let Some(runtime) = self.runtime() else {
			return;
		};
		match key {
			Some(key) => self.notify_key(&runtime, key),
			None => {
				let keys: Vec<String> = self.inner.deps.borrow().keys().cloned().collect();
				for key in keys {
					self.notify_key(&runtime, &key);
				}
			}
		}
		runtime.request_flush();
	}

	fn notify_key(&self, runtime: &Runtime, key: &str) {
		let subscribers = self.inner.subscribers_of(key);
		if subscribers.is_empty() {
			return;
		}
		let dead = runtime.dispatch(&subscribers);
		self.inner.prune(key, &dead);
	}

	/// Subscribers currently recorded for `key`
	pub fn subscribers_of(&self, key: &str) -> Vec<SubscriberId> {
		self.inner.subscribers_of(key)
	}
}

impl PartialEq for State {
	fn eq(&self, other: &Self) -> bool {
		self.ptr_eq(other)
	}
}

impl fmt::Debug for State {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("State")
			.field("id", &self.inner.id)
			.field("keys", &self.inner.data.borrow().keys().collect::<Vec<_>>())
			.finish()
	}
}

impl TryFrom<Value> for State {
	type Error = ValueError;

	fn try_from(value: Value) -> Result<Self, Self::Error> {
		match value {
			Value::Object(state) => Ok(state),
			Value::Map(map) => Ok(State::new(map)),
			other => Err(ValueError::NotAnObject {
				type_name: other.type_name(),
			}),
		}
	}
}

impl Runtime {
	/// Wrap a value in this runtime
	///
	/// An object is returned as is; a map is wrapped. Anything else yields an
	/// empty object and a warning.
	pub fn state(&self, value: impl Into<Value>) -> State {
		match value.into() {
			Value::Object(state) => state,
			Value::Map(map) => State::new_in(self, map),
			other => {
				tracing::warn!(
					target: logging::REACTIVE,
					type_name = other.type_name(),
					"only maps can be made reactive, creating an empty object"
				);
				State::new_in(self, Map::new())
			}
		}
	}
}

/// Create an observable object in the thread's default runtime
///
/// # Example
///
/// ```ignore
/// let counter = state(serde_json::json!({"count": 0}));
/// assert_eq!(counter.get("count"), Value::from(0));
/// ```
pub fn state(value: impl Into<Value>) -> State {
	with_runtime(|rt| rt.state(value))
}

/// Make a value reactive
///
/// Maps are wrapped, objects come back unchanged (the same wrapper) and every
/// other value passes through as is.
pub fn reactive(value: impl Into<Value>) -> Value {
	match value.into() {
		Value::Map(map) => Value::Object(State::new(map)),
		other => other,
	}
}

/// Whether the value is an observable object
pub fn is_reactive(value: &Value) -> bool {
	value.is_reactive()
}

/// Deep plain copy of a value, unwrapping every object
pub fn to_raw(value: &Value) -> Value {
	value.to_raw()
}

/// Force the readers of an object (or of one of its keys) to run
pub fn notify(state: &State, key: Option<&str>) {
	state.notify(key);
}

/// Run `f` on the thread's default runtime without recording dependencies
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
	Runtime::current().untrack(f)
}
