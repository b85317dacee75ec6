//! Reactive System - Dependency-tracked state
//!
//! This module provides the reactive core: observable objects, effects,
//! watchers, computed properties and the batching scheduler that runs them.
//!
//! ## Core Concepts
//!
//! - **State**: an observable key/value object holding [`Value`]s
//! - **Effect**: a closure re-run when a key it read changes
//! - **Watch**: a callback receiving new and old values of a selector
//! - **Computed**: a cached derived property stored under a key
//! - **Runtime**: owns the observer stack, the subscriber registry and the
//!   pending-update queue
//!
//! ## Example
//!
//! ```ignore
//! use reinhardt_state_core::reactive::{batch, computed, effect, state};
//! use serde_json::json;
//!
//! let cart = state(json!({"price": 10, "quantity": 2}));
//! computed(&cart, "total", |c| {
//!     c.get("price").as_f64().unwrap_or(0.0) * c.get("quantity").as_f64().unwrap_or(0.0)
//! });
//!
//! let cart_clone = cart.clone();
//! effect(move || println!("total = {:?}", cart_clone.get("total")));
//!
//! batch(|| {
//!     cart.set("price", 12);
//!     cart.set("quantity", 3);
//! }); // prints once: total = Number(36.0)
//! ```

pub mod computed;
pub mod effect;
pub mod runtime;
pub mod scheduler;
pub mod state;
pub mod value;
pub mod watch;

pub use computed::computed;
pub use effect::{EffectHandle, effect, try_effect};
pub use runtime::{Runtime, SubscriberId, SubscriberKind, WeakRuntime, with_runtime};
pub use scheduler::{BatchGuard, batch, flush, pause, resume};
pub use state::{State, is_reactive, notify, reactive, state, to_raw, untrack};
pub use value::{Map, Opaque, Value};
pub use watch::{WatchOptions, watch, watch_with, watch_with_options};
