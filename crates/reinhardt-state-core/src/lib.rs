//! # Reinhardt State Core
//!
//! Dependency-tracking reactive state for Reinhardt front ends.
//!
//! Reads of a [`State`] made inside an effect, watcher or computed getter are
//! recorded; writes queue exactly the subscribers that read the written key.
//! Queued subscribers run in tiers (computed, then watchers, then effects),
//! once per flush, with batching, pause/resume and a cycle guard.
//!
//! ## Modules
//!
//! - [`reactive`]: observable objects, effects, computed properties, watchers
//!   and the scheduler
//! - [`cleanup`]: disposer collection and scopes
//! - [`collection`]: list helpers over an observable `items` array
//! - [`form`]: reactive forms with validators
//! - [`async_state`]: request state with supersede and abort
//! - [`storage`]: persistent store, autosave and cross-tab sync (`storage` feature)
//! - [`binding`]: element bindings over a host sink (`binding` feature)
//!
//! ## Example
//!
//! ```ignore
//! use reinhardt_state_core::prelude::*;
//! use serde_json::json;
//!
//! let counter = state(json!({"count": 0}));
//! computed(&counter, "double", |c| c.get("count").as_i64().unwrap_or(0) * 2);
//!
//! let counter_clone = counter.clone();
//! let _log = effect(move || println!("double = {:?}", counter_clone.get("double")));
//!
//! counter.set("count", 1); // prints: double = Number(2.0)
//! ```

pub mod async_state;
#[cfg(feature = "binding")]
pub mod binding;
pub mod cleanup;
pub mod collection;
pub mod config;
pub mod error;
pub mod form;
pub(crate) mod logging;
pub mod reactive;
#[cfg(feature = "storage")]
pub mod storage;

pub use async_state::{AbortController, AbortSignal, AsyncOutcome, AsyncState};
#[cfg(feature = "binding")]
pub use binding::{Binding, BindingUpdate, ElementSink, bind, bind_text};
pub use cleanup::{CleanupCollector, scope};
pub use collection::Collection;
pub use config::{FlushMode, RuntimeConfig, Settings, StorageConfig};
pub use error::{
	AsyncStateError, BoxError, ConfigError, FailureCause, FormError, SchedulerError, StateError,
	StateResult, SubscriberError, ValueError,
};
#[cfg(feature = "storage")]
pub use error::StorageError;
pub use form::{Form, Validator};
pub use reactive::{
	BatchGuard, EffectHandle, Map, Opaque, Runtime, State, SubscriberId, SubscriberKind, Value,
	WatchOptions, WeakRuntime,
};
#[cfg(feature = "storage")]
pub use storage::{
	AutosaveOptions, Envelope, MemoryStorage, PersistentStore, StorageBackend, StorageEvent,
	StorageSync, autosave,
};

/// Everything needed to build reactive views
pub mod prelude {
	pub use crate::async_state::AsyncState;
	#[cfg(feature = "binding")]
	pub use crate::binding::{Binding, ElementSink, bind, bind_text};
	pub use crate::cleanup::{CleanupCollector, scope};
	pub use crate::collection::Collection;
	pub use crate::form::{Form, validators};
	pub use crate::reactive::{
		EffectHandle, Runtime, State, Value, WatchOptions, batch, computed, effect, flush,
		is_reactive, notify, pause, reactive, resume, state, to_raw, try_effect, untrack, watch,
		watch_with,
	};
	#[cfg(feature = "storage")]
	pub use crate::storage::{AutosaveOptions, PersistentStore, autosave};
}
