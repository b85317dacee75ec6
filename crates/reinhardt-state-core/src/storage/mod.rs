//! Persistent storage
//!
//! This module persists reactive objects to a key/value string store such as
//! the browser's `localStorage`:
//!
//! - [`StorageBackend`]: the seam to the actual store, with an in-memory
//!   implementation ([`MemoryStorage`]) for native targets and tests
//! - [`PersistentStore`]: namespaced JSON envelopes with optional expiry
//! - [`autosave`]: keeps a [`State`](crate::reactive::State) and a stored entry
//!   in sync, including changes made by other tabs ([`StorageSync::handle_event`])

pub mod autosave;
pub mod backend;
pub mod envelope;
pub mod store;

pub use autosave::{AutosaveOptions, StorageEvent, StorageSync, autosave};
pub use backend::{MemoryStorage, StorageBackend};
pub use envelope::Envelope;
pub use store::PersistentStore;
