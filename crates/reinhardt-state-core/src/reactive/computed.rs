//! Computed - Cached derived properties
//!
//! A computed property lives under a key of a [`State`] and is produced by a
//! getter closure. The getter runs lazily: only when the key is read while the
//! cached value is stale. Reads inside the getter become the property's own
//! dependency set, and a write to any of them marks the property stale again.
//!
//! ## Example
//!
//! ```ignore
//! use reinhardt_state_core::reactive::{computed, state, Value};
//!
//! let counter = state(serde_json::json!({"count": 1}));
//! computed(&counter, "double", |s| s.get("count").as_f64().unwrap_or(0.0) * 2.0);
//!
//! assert_eq!(counter.get("double"), Value::from(2));
//! counter.set("count", 5);
//! assert_eq!(counter.get("double"), Value::from(10));
//! ```

use core::cell::RefCell;
use std::rc::Rc;

use crate::error::{FailureCause, SubscriberError};
use crate::logging;

use super::effect::EffectHandle;
use super::runtime::{Job, Runtime, SubscriberId, SubscriberKind, panic_message};
use super::state::State;
use super::value::Value;

type Getter = Rc<RefCell<dyn FnMut(&State) -> Value>>;

/// Cache slot of a computed property
pub(crate) struct ComputedEntry {
	pub(crate) id: SubscriberId,
	getter: Getter,
	cached: Value,
	pub(crate) dirty: bool,
}

impl Runtime {
	/// Define `key` of `state` as a computed property
	///
	/// Plain data previously stored under `key` is discarded, and a computed
	/// property already defined there is replaced. Readers of the key are
	/// notified so they pick up the new definition.
	pub fn computed<T, F>(&self, state: &State, key: &str, mut f: F) -> EffectHandle
	where
		T: Into<Value>,
		F: FnMut(&State) -> T + 'static,
	{
		let getter: Getter = Rc::new(RefCell::new(move |state: &State| f(state).into()));
		let id = self.register(
			SubscriberKind::Computed,
			Job::Computed {
				owner: Rc::downgrade(&state.inner),
				key: key.to_string(),
			},
		);

		let previous = state.inner.install_computed(
			key,
			ComputedEntry {
				id,
				getter,
				cached: Value::Null,
				dirty: true,
			},
		);
		if let Some(previous) = previous {
			tracing::debug!(target: logging::REACTIVE, key, "replacing computed property");
			self.dispose(previous.id);
		}

		state.take_data(key);
		state.notify(Some(key));
		EffectHandle::new(self.clone(), id)
	}
}

impl State {
	/// Return the cached value of a computed key, recomputing it if stale
	pub(crate) fn read_computed(&self, runtime: &Runtime, key: &str) -> Value {
		let (id, getter, cached, dirty) = {
			let computed = self.inner.computed.borrow();
			let Some(entry) = computed.get(key) else {
				return Value::Null;
			};
			(entry.id, entry.getter.clone(), entry.cached.clone(), entry.dirty)
		};
		if !dirty {
			return cached;
		}

		let Ok(mut body) = getter.try_borrow_mut() else {
			tracing::warn!(
				target: logging::REACTIVE,
				key,
				"computed property read itself while computing, returning the cached value"
			);
			return cached;
		};

		runtime.clear_dependencies(id);
		let outcome = {
			let _observer = runtime.push_observer(Some(id));
			std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (&mut *body)(self)))
		};
		drop(body);

		match outcome {
			Ok(value) => {
				if let Some(entry) = self.inner.computed.borrow_mut().get_mut(key)
					&& entry.id == id
				{
					entry.cached = value.clone();
					entry.dirty = false;
				}
				value
			}
			Err(payload) => {
				// Keep the old value as clean so the next source write invalidates again.
				if let Some(entry) = self.inner.computed.borrow_mut().get_mut(key)
					&& entry.id == id
				{
					entry.dirty = false;
				}
				runtime.report(
					SubscriberError {
						id,
						kind: SubscriberKind::Computed,
						cause: FailureCause::Panicked(panic_message(payload.as_ref())),
					}
					.into(),
				);
				cached
			}
		}
	}
}

/// Define a computed property on the runtime owning `state`
pub fn computed<T, F>(state: &State, key: &str, f: F) -> EffectHandle
where
	T: Into<Value>,
	F: FnMut(&State) -> T + 'static,
{
	state
		.runtime()
		.unwrap_or_else(Runtime::current)
		.computed(state, key, f)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::StateError;
	use rstest::rstest;
	use serde_json::json;

	fn double(rt: &Runtime, state: &State) -> (EffectHandle, Rc<RefCell<usize>>) {
		let calls = Rc::new(RefCell::new(0));
		let calls_clone = calls.clone();
		let handle = rt.computed(state, "double", move |s| {
			*calls_clone.borrow_mut() += 1;
			s.get("count").as_f64().unwrap_or(0.0) * 2.0
		});
		(handle, calls)
	}

	#[rstest]
	fn test_computed_is_lazy_and_cached() {
		let rt = Runtime::new();
		let state = rt.state(json!({"count": 0}));
		let (_handle, calls) = double(&rt, &state);
		assert_eq!(*calls.borrow(), 0);

		state.set("count", 1);
		assert_eq!(state.get("double"), Value::from(2));
		assert_eq!(state.get("double"), Value::from(2));
		assert_eq!(state.get("double"), Value::from(2));

		assert_eq!(*calls.borrow(), 1);
	}

	#[rstest]
	fn test_write_marks_dirty_synchronously() {
		let rt = Runtime::new();
		let state = rt.state(json!({"count": 1}));
		let (_handle, calls) = double(&rt, &state);
		assert_eq!(state.get("double"), Value::from(2));

		rt.batch(|| {
			state.set("count", 4);
			assert_eq!(state.get("double"), Value::from(8));
		});

		assert_eq!(*calls.borrow(), 2);
	}

	#[rstest]
	fn test_effects_reading_computed_rerun() {
		let rt = Runtime::new();
		let state = rt.state(json!({"count": 1}));
		let _ = double(&rt, &state);
		let seen = Rc::new(RefCell::new(Vec::new()));

		let seen_clone = seen.clone();
		let state_clone = state.clone();
		let _effect = rt.effect(move || seen_clone.borrow_mut().push(state_clone.get("double")));
		state.set("count", 2);

		assert_eq!(*seen.borrow(), vec![Value::from(2), Value::from(4)]);
	}

	#[rstest]
	fn test_computed_chain_invalidates_transitively() {
		let rt = Runtime::new();
		let state = rt.state(json!({"count": 1}));
		let _ = double(&rt, &state);
		let _quad = rt.computed(&state, "quad", |s| {
			s.get("double").as_f64().unwrap_or(0.0) * 2.0
		});
		assert_eq!(state.get("quad"), Value::from(4));

		rt.pause();
		state.set("count", 3);
		assert_eq!(state.get("quad"), Value::from(12));
		rt.resume(true);
	}

	#[rstest]
	fn test_assigning_computed_key_is_rejected() {
		let rt = Runtime::new();
		let state = rt.state(json!({"count": 1, "double": "raw"}));
		let _ = double(&rt, &state);

		assert!(!state.set("double", 10));
		assert_eq!(state.get("double"), Value::from(2));
		assert!(!state.keys().contains(&"double".to_string()));
	}

	#[rstest]
	fn test_panicking_getter_keeps_cache() {
		let rt = Runtime::new();
		let state = rt.state(json!({"count": 1}));
		let errors = Rc::new(RefCell::new(0));
		let errors_clone = errors.clone();
		rt.on_error(move |err| {
			if matches!(err, StateError::Subscriber(_)) {
				*errors_clone.borrow_mut() += 1;
			}
		});

		let _handle = rt.computed(&state, "inverse", |s| {
			let count = s.get("count").as_f64().unwrap_or(0.0);
			if count == 0.0 {
				panic!("division by zero");
			}
			1.0 / count
		});
		assert_eq!(state.get("inverse"), Value::from(1));

		state.set("count", 0);
		assert_eq!(state.get("inverse"), Value::from(1));
		assert_eq!(*errors.borrow(), 1);
	}

	#[rstest]
	fn test_readers_recover_after_getter_panic() {
		let rt = Runtime::new();
		let state = rt.state(json!({"count": 1}));
		rt.on_error(|_| {});
		let _handle = rt.computed(&state, "inverse", |s| {
			let count = s.get("count").as_f64().unwrap_or(0.0);
			if count == 0.0 {
				panic!("division by zero");
			}
			1.0 / count
		});
		let seen = Rc::new(RefCell::new(Vec::new()));

		let seen_clone = seen.clone();
		let state_clone = state.clone();
		let _effect = rt.effect(move || seen_clone.borrow_mut().push(state_clone.get("inverse")));
		state.set("count", 0);
		state.set("count", 2);
		state.set("count", 4);

		assert_eq!(
			*seen.borrow(),
			vec![
				Value::from(1),
				Value::from(1),
				Value::from(0.5),
				Value::from(0.25),
			]
		);
	}

	#[rstest]
	fn test_dispose_removes_property() {
		let rt = Runtime::new();
		let state = rt.state(json!({"count": 1}));
		let (handle, _) = double(&rt, &state);

		handle.dispose();

		assert_eq!(state.get("double"), Value::Null);
		assert!(state.subscribers_of("count").is_empty());
	}
}
