//! Tracing targets used across the crate.
//!
//! The library only emits `tracing` events; installing a subscriber (for
//! example `tracing-subscriber` on native targets or a console layer in the
//! browser) is left to the host application. Filter on these targets to scope
//! the output, e.g. `RUST_LOG=reinhardt_state::scheduler=debug`.

/// Dependency tracking, state reads and writes, subscriber failures.
pub(crate) const REACTIVE: &str = "reinhardt_state::reactive";

/// Batching and flush loop.
pub(crate) const SCHEDULER: &str = "reinhardt_state::scheduler";

/// Cleanup collectors.
pub(crate) const CLEANUP: &str = "reinhardt_state::cleanup";

/// Persistent storage, autosave and cross-tab sync.
#[cfg(feature = "storage")]
pub(crate) const STORAGE: &str = "reinhardt_state::storage";

/// Forms and async state helpers.
pub(crate) const HELPERS: &str = "reinhardt_state::helpers";

/// Element bindings.
#[cfg(feature = "binding")]
pub(crate) const BINDING: &str = "reinhardt_state::binding";
