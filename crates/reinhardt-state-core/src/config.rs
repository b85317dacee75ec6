//! Runtime and storage settings
//!
//! Settings are plain `serde` structs with defaults for every field, so a
//! settings file only needs to name what it overrides:
//!
//! ```toml
//! [runtime]
//! flush_mode = "deferred"
//! max_flush_iterations = 50
//!
//! [storage]
//! namespace = "todo-app"
//! default_ttl_secs = 3600
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default cap on flush cycles before the scheduler gives up.
pub const DEFAULT_MAX_FLUSH_ITERATIONS: usize = 100;

/// Default storage namespace.
pub const DEFAULT_NAMESPACE: &str = "reinhardt";

/// When queued subscribers run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
	/// Unbatched writes flush before `set` returns.
	#[default]
	Sync,
	/// Writes only queue; the flush is requested from the host's microtask hook
	/// (see [`Runtime::set_microtask_scheduler`](crate::reactive::Runtime::set_microtask_scheduler))
	/// or driven manually with [`Runtime::flush`](crate::reactive::Runtime::flush).
	Deferred,
}

/// Reactive runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
	/// Flush strategy.
	pub flush_mode: FlushMode,
	/// Maximum flush cycles per flush before the remaining queue is dropped.
	pub max_flush_iterations: usize,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			flush_mode: FlushMode::Sync,
			max_flush_iterations: DEFAULT_MAX_FLUSH_ITERATIONS,
		}
	}
}

impl RuntimeConfig {
	/// Settings for a runtime that defers flushes to a microtask.
	pub fn deferred() -> Self {
		Self {
			flush_mode: FlushMode::Deferred,
			..Self::default()
		}
	}

	/// Override the flush cycle cap.
	pub fn with_max_flush_iterations(mut self, max: usize) -> Self {
		self.max_flush_iterations = max;
		self
	}
}

/// Persistent storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
	/// Prefix of every stored key (`"<namespace>:<key>"`).
	pub namespace: String,
	/// Expiry applied when a write does not specify one.
	pub default_ttl_secs: Option<u64>,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			namespace: DEFAULT_NAMESPACE.to_string(),
			default_ttl_secs: None,
		}
	}
}

/// All settings of the crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
	/// Reactive runtime settings.
	pub runtime: RuntimeConfig,
	/// Persistent storage settings.
	pub storage: StorageConfig,
}

impl Settings {
	/// Parse settings from a TOML document.
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		Ok(toml::from_str(source)?)
	}

	/// Parse settings from a JSON document.
	pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
		Ok(serde_json::from_str(source)?)
	}
}
