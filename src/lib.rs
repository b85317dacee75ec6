//! # Reinhardt State
//!
//! Dependency-tracking reactive state for Reinhardt front ends.
//!
//! This facade re-exports [`reinhardt_state_core`]. Observable objects record
//! which keys each effect, watcher or computed property reads, and a write
//! re-runs exactly those subscribers, batched and in priority order.
//!
//! ## Feature Flags
//!
//! - `full` (default) - Everything below
//! - `storage` - Persistent store with expiry, autosave and cross-tab sync
//! - `binding` - Element bindings over a host-provided `ElementSink`
//!
//! ## Quick Start
//!
//! ```ignore
//! use reinhardt_state::prelude::*;
//! use serde_json::json;
//!
//! let counter = state(json!({"count": 0}));
//!
//! let counter_clone = counter.clone();
//! let _log = effect(move || println!("count = {:?}", counter_clone.get("count")));
//!
//! batch(|| {
//!     counter.set("count", 1);
//!     counter.set("count", 2);
//! }); // prints once: count = Number(2.0)
//! ```

pub use reinhardt_state_core::*;

/// Re-export commonly used items
pub mod prelude {
	pub use reinhardt_state_core::prelude::*;
}
