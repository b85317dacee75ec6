//! Error types for the reactive state core.
//!
//! Nothing in the reactive core throws back through a property write. Failures
//! raised inside subscribers, runaway flushes and storage problems are turned
//! into the typed errors below and handed to the runtime's error handlers
//! (see [`Runtime::on_error`](crate::reactive::Runtime::on_error)), so they are
//! observable in tests instead of only showing up in logs.

use thiserror::Error;

use crate::reactive::{SubscriberId, SubscriberKind};

/// Boxed error returned by fallible user closures (effects, submit handlers, requests).
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Umbrella error for everything the crate can report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StateError {
	/// A subscriber body failed or panicked.
	#[error(transparent)]
	Subscriber(#[from] SubscriberError),

	/// The flush scheduler gave up on a runaway update loop.
	#[error(transparent)]
	Scheduler(#[from] SchedulerError),

	/// A value could not be converted.
	#[error(transparent)]
	Value(#[from] ValueError),

	/// Persistent storage failed.
	#[cfg(feature = "storage")]
	#[error(transparent)]
	Storage(#[from] StorageError),

	/// Form validation or submission failed.
	#[error(transparent)]
	Form(#[from] FormError),

	/// An async state request failed.
	#[error(transparent)]
	Async(#[from] AsyncStateError),

	/// Settings could not be loaded.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

/// Why a subscriber run did not complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
	/// The body returned an error.
	Failed(String),
	/// The body panicked; the payload message is kept when it is a string.
	Panicked(String),
}

impl std::fmt::Display for FailureCause {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Failed(message) => write!(f, "returned an error: {message}"),
			Self::Panicked(message) => write!(f, "panicked: {message}"),
		}
	}
}

/// A failure inside an effect, watcher or computed getter.
///
/// The subscriber stays registered; it runs again on the next change of one of
/// its dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} subscriber {id} {cause}")]
pub struct SubscriberError {
	/// Subscriber that failed.
	pub id: SubscriberId,
	/// Kind of the subscriber.
	pub kind: SubscriberKind,
	/// What went wrong.
	pub cause: FailureCause,
}

/// Scheduler failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SchedulerError {
	/// Updates kept re-queuing more updates past the configured cap; the rest of
	/// the queue was dropped.
	#[error("flush aborted after {iterations} cycles, {dropped} pending updates dropped")]
	CycleLimit {
		/// Cycle cap that was hit.
		iterations: usize,
		/// Number of queued subscribers that were discarded.
		dropped: usize,
	},
}

/// Value conversion failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValueError {
	/// Opaque platform values have no JSON representation.
	#[error("value of type `{type_name}` cannot be serialized")]
	NotSerializable {
		/// Type name of the opaque value.
		type_name: &'static str,
	},

	/// A reactive object can only wrap a map.
	#[error("expected an object, found {type_name}")]
	NotAnObject {
		/// Kind of the value that was supplied.
		type_name: &'static str,
	},
}

/// Persistent storage failures.
#[cfg(feature = "storage")]
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
	/// Writing the entry would exceed the backend quota.
	#[error("storage quota exceeded while writing `{key}` ({required} bytes required, {available} available)")]
	QuotaExceeded {
		/// Namespaced key being written.
		key: String,
		/// Bytes the write needed.
		required: usize,
		/// Bytes left in the quota.
		available: usize,
	},

	/// The value could not be turned into JSON.
	#[error("failed to serialize value for `{key}`: {source}")]
	Serialization {
		/// Namespaced key being written.
		key: String,
		/// Underlying conversion error.
		#[source]
		source: ValueError,
	},

	/// The stored envelope is not valid JSON or has the wrong shape.
	#[error("malformed storage envelope under `{key}`: {source}")]
	Envelope {
		/// Namespaced key being read or written.
		key: String,
		/// Underlying JSON error.
		#[source]
		source: serde_json::Error,
	},

	/// The backend itself reported a failure.
	#[error("storage backend error: {0}")]
	Backend(String),
}

/// Form failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FormError {
	/// Validation failed for the listed fields.
	#[error("form is invalid: {}", fields.join(", "))]
	Invalid {
		/// Fields carrying an error message.
		fields: Vec<String>,
	},

	/// A submission is already in flight.
	#[error("form is already submitting")]
	AlreadySubmitting,

	/// The submit handler failed.
	#[error("form submission failed: {0}")]
	Submit(String),
}

/// Async state failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AsyncStateError {
	/// The request was cancelled with `abort()` before it resolved.
	#[error("request aborted")]
	Aborted,

	/// The request future resolved to an error.
	#[error("request failed: {0}")]
	Failed(String),
}

/// Settings loading failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
	/// TOML parse error.
	#[error("invalid TOML settings: {0}")]
	Toml(#[from] toml::de::Error),

	/// JSON parse error.
	#[error("invalid JSON settings: {0}")]
	Json(#[from] serde_json::Error),
}
