//! Autosave and cross-tab sync
//!
//! [`autosave`] loads a stored entry into a [`State`] and registers an effect
//! that writes a snapshot back on every change. Changes made by another tab
//! arrive as [`StorageEvent`]s; [`StorageSync::handle_event`] applies them while
//! holding a lock that keeps the autosave effect from echoing them back.
//!
//! ## Example
//!
//! ```ignore
//! use reinhardt_state_core::reactive::state;
//! use reinhardt_state_core::storage::{AutosaveOptions, PersistentStore, autosave};
//!
//! let todos = state(serde_json::json!({"items": []}));
//! let sync = autosave(&todos, &store, "todos", AutosaveOptions::default());
//!
//! // wired to window.addEventListener("storage", ...)
//! sync.handle_event(&event);
//! ```

use core::cell::Cell;
use core::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::error::StorageError;
use crate::logging;
use crate::reactive::{EffectHandle, Runtime, State, Value};

use super::envelope::Envelope;
use super::store::PersistentStore;

type ErrorCallback = Rc<dyn Fn(&StorageError)>;

/// A change to the backend made outside this store, e.g. by another tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
	/// Backend key that changed (namespaced)
	pub key: String,
	/// Raw entry before the change
	pub old_value: Option<String>,
	/// Raw entry after the change; `None` when the entry was removed
	pub new_value: Option<String>,
}

/// Options for [`autosave`]
#[derive(Clone)]
pub struct AutosaveOptions {
	/// Expiry of every write; falls back to the store's default when `None`
	pub ttl: Option<Duration>,
	/// Load the stored entry into the state before saving
	pub load: bool,
	/// Receives write and load failures; they are logged when unset
	pub on_error: Option<ErrorCallback>,
}

impl Default for AutosaveOptions {
	fn default() -> Self {
		Self {
			ttl: None,
			load: true,
			on_error: None,
		}
	}
}

impl AutosaveOptions {
	/// Write entries expiring after `ttl`
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = Some(ttl);
		self
	}

	/// Skip loading the stored entry
	pub fn without_load(mut self) -> Self {
		self.load = false;
		self
	}

	/// Route failures to `callback`
	pub fn on_error<F>(mut self, callback: F) -> Self
	where
		F: Fn(&StorageError) + 'static,
	{
		self.on_error = Some(Rc::new(callback));
		self
	}
}

impl fmt::Debug for AutosaveOptions {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AutosaveOptions")
			.field("ttl", &self.ttl)
			.field("load", &self.load)
			.field("on_error", &self.on_error.is_some())
			.finish()
	}
}

fn report(callback: Option<&ErrorCallback>, error: &StorageError) {
	match callback {
		Some(callback) => callback(error),
		None => tracing::error!(target: logging::STORAGE, error = %error, "autosave failed"),
	}
}

/// Make `state` hold exactly the keys of `map`
fn replace_data(state: &State, map: crate::reactive::Map) {
	for key in state.keys_untracked() {
		if !map.contains_key(&key) {
			state.remove(&key);
		}
	}
	for (key, value) in map {
		state.set(&key, value);
	}
}

/// Live link between a state and a stored entry
pub struct StorageSync {
	runtime: Runtime,
	state: State,
	store: PersistentStore,
	key: String,
	ttl: Option<Duration>,
	syncing: Rc<Cell<bool>>,
	on_error: Option<ErrorCallback>,
	effect: EffectHandle,
}

impl StorageSync {
	/// Namespaced backend key this sync listens to
	pub fn storage_key(&self) -> String {
		self.store.namespaced_key(&self.key)
	}

	/// Apply a change made elsewhere to the state
	///
	/// Returns `false` when the event concerns another key or carries an
	/// unusable entry. Applying the change does not write it back.
	pub fn handle_event(&self, event: &StorageEvent) -> bool {
		let full_key = self.storage_key();
		if event.key != full_key {
			return false;
		}

		let incoming = match &event.new_value {
			None => crate::reactive::Map::new(),
			Some(raw) => match Envelope::decode(&full_key, raw) {
				Ok(envelope) if envelope.is_expired(self.store.now()) => {
					tracing::debug!(target: logging::STORAGE, key = %full_key, "ignoring expired foreign entry");
					return false;
				}
				Ok(envelope) => match Value::from(envelope.value) {
					Value::Map(map) => map,
					other => {
						tracing::warn!(
							target: logging::STORAGE,
							key = %full_key,
							type_name = other.type_name(),
							"foreign entry is not an object"
						);
						return false;
					}
				},
				Err(error) => {
					report(self.on_error.as_ref(), &error);
					return false;
				}
			},
		};

		self.syncing.set(true);
		self.runtime.batch(|| replace_data(&self.state, incoming));
		if self.runtime.is_batching() || self.runtime.is_busy() {
			// The autosave effect runs later and releases the lock itself.
			if !self.runtime.is_queued(self.effect.id()) {
				self.syncing.set(false);
			}
		} else {
			// Deferred runtimes have not run the effect yet; it must see the lock.
			let _ = self.runtime.flush();
			self.syncing.set(false);
		}

		tracing::debug!(target: logging::STORAGE, key = %full_key, "applied foreign change");
		true
	}

	/// Write the current state immediately
	pub fn save_now(&self) -> Result<(), StorageError> {
		let snapshot = self.state.to_raw();
		match self.ttl {
			Some(ttl) => self.store.set_with_expiry(&self.key, &snapshot, Some(ttl)),
			None => self.store.set(&self.key, &snapshot),
		}
	}

	/// Stop saving; the stored entry is kept
	pub fn dispose(&self) {
		self.effect.dispose();
	}

	/// Whether [`dispose`](Self::dispose) has been called
	pub fn is_disposed(&self) -> bool {
		self.effect.is_disposed()
	}
}

impl fmt::Debug for StorageSync {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("StorageSync")
			.field("key", &self.storage_key())
			.field("disposed", &self.is_disposed())
			.finish()
	}
}

/// Load `key` into `state`, then save `state` under `key` on every change
pub fn autosave(
	state: &State,
	store: &PersistentStore,
	key: &str,
	options: AutosaveOptions,
) -> StorageSync {
	let runtime = state.runtime().unwrap_or_else(Runtime::current);
	let AutosaveOptions { ttl, load, on_error } = options;

	if load {
		match store.get(key) {
			Ok(Some(Value::Map(map))) => {
				tracing::debug!(target: logging::STORAGE, key, "restoring stored state");
				runtime.batch(|| {
					for (field, value) in map {
						state.set(&field, value);
					}
				});
			}
			Ok(Some(other)) => tracing::warn!(
				target: logging::STORAGE,
				key,
				type_name = other.type_name(),
				"stored entry is not an object, ignoring it"
			),
			Ok(None) => {}
			Err(error) => report(on_error.as_ref(), &error),
		}
	}

	let syncing = Rc::new(Cell::new(false));
	let effect = {
		let state = state.clone();
		let store = store.clone();
		let key = key.to_string();
		let syncing = syncing.clone();
		let on_error = on_error.clone();
		runtime.effect(move || {
			// Snapshot first so the keys stay tracked while the lock is held.
			let snapshot = state.snapshot();
			if syncing.replace(false) {
				return;
			}
			let result = match ttl {
				Some(ttl) => store.set_with_expiry(&key, &snapshot, Some(ttl)),
				None => store.set(&key, &snapshot),
			};
			if let Err(error) = result {
				report(on_error.as_ref(), &error);
			}
		})
	};

	StorageSync {
		runtime,
		state: state.clone(),
		store: store.clone(),
		key: key.to_string(),
		ttl,
		syncing,
		on_error,
		effect,
	}
}
