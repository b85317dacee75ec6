//! Watch - Change callbacks with old and new values
//!
//! A watcher evaluates a selector under tracking and calls its callback with
//! the new and the previous result whenever the result changes. The callback
//! itself runs untracked, so reads inside it do not widen what is watched.
//! Watchers are flushed after computed properties and before effects.

use core::cell::RefCell;
use std::rc::Rc;

use super::effect::EffectHandle;
use super::runtime::{Runtime, SubscriberKind};
use super::state::State;
use super::value::Value;

/// Options for [`watch_with_options`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchOptions {
	/// Call the callback once on registration, with `Null` as the old value
	pub immediate: bool,
}

impl WatchOptions {
	/// Options with `immediate` set
	pub fn immediate() -> Self {
		Self { immediate: true }
	}
}

impl Runtime {
	/// Watch the result of `selector`
	pub fn watch_with<S, C>(&self, selector: S, callback: C) -> EffectHandle
	where
		S: FnMut() -> Value + 'static,
		C: FnMut(&Value, &Value) + 'static,
	{
		self.watch_with_options(selector, callback, WatchOptions::default())
	}

	/// Watch the result of `selector` with explicit options
	pub fn watch_with_options<S, C>(
		&self,
		mut selector: S,
		mut callback: C,
		options: WatchOptions,
	) -> EffectHandle
	where
		S: FnMut() -> Value + 'static,
		C: FnMut(&Value, &Value) + 'static,
	{
		let previous: Rc<RefCell<Option<Value>>> = Rc::new(RefCell::new(None));
		let runtime = self.downgrade();

		self.spawn(SubscriberKind::Watch, move || {
			let next = selector();
			let old = previous.borrow_mut().replace(next.clone());

			let changed = match &old {
				None => options.immediate,
				Some(old) => *old != next,
			};
			if changed {
				let old = old.unwrap_or_default();
				match runtime.upgrade() {
					Some(runtime) => runtime.untrack(|| callback(&next, &old)),
					None => callback(&next, &old),
				}
			}
			Ok(())
		})
	}

	/// Watch one key of `state`
	pub fn watch<C>(&self, state: &State, key: &str, callback: C) -> EffectHandle
	where
		C: FnMut(&Value, &Value) + 'static,
	{
		let state = state.clone();
		let key = key.to_string();
		self.watch_with(move || state.get(&key), callback)
	}
}

/// Watch one key of `state` on the runtime owning it
///
/// # Example
///
/// ```ignore
/// let counter = state(serde_json::json!({"count": 0}));
/// let _handle = watch(&counter, "count", |new, old| {
///     println!("count changed from {old:?} to {new:?}");
/// });
/// counter.set("count", 1);
/// ```
pub fn watch<C>(state: &State, key: &str, callback: C) -> EffectHandle
where
	C: FnMut(&Value, &Value) + 'static,
{
	state
		.runtime()
		.unwrap_or_else(Runtime::current)
		.watch(state, key, callback)
}

/// Watch the result of `selector` on the thread's default runtime
pub fn watch_with<S, C>(selector: S, callback: C) -> EffectHandle
where
	S: FnMut() -> Value + 'static,
	C: FnMut(&Value, &Value) + 'static,
{
	Runtime::current().watch_with(selector, callback)
}

/// Watch the result of `selector` on the thread's default runtime with options
pub fn watch_with_options<S, C>(selector: S, callback: C, options: WatchOptions) -> EffectHandle
where
	S: FnMut() -> Value + 'static,
	C: FnMut(&Value, &Value) + 'static,
{
	Runtime::current().watch_with_options(selector, callback, options)
}
