//! Namespaced store with expiry
//!
//! [`PersistentStore`] writes [`Envelope`]s under `"<namespace>:<key>"`.
//! Expired entries are not swept in the background; a read that finds one
//! removes it and reports the key as absent.

use core::fmt;
use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::logging;
use crate::reactive::Value;

use super::backend::StorageBackend;
use super::envelope::Envelope;

type Clock = Rc<dyn Fn() -> u64>;

/// Wall clock in milliseconds since the Unix epoch; reads `Date.now()` on wasm32
fn system_clock() -> u64 {
	u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

fn duration_ms(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// JSON store over a [`StorageBackend`]
///
/// Clones share the backend.
#[derive(Clone)]
pub struct PersistentStore {
	backend: Rc<dyn StorageBackend>,
	namespace: String,
	default_ttl: Option<Duration>,
	clock: Clock,
}

impl PersistentStore {
	/// Create a store writing under `namespace`
	pub fn new<B>(backend: B, namespace: impl Into<String>) -> Self
	where
		B: StorageBackend + 'static,
	{
		Self {
			backend: Rc::new(backend),
			namespace: namespace.into(),
			default_ttl: None,
			clock: Rc::new(system_clock),
		}
	}

	/// Create a store from settings
	pub fn from_config<B>(backend: B, config: &StorageConfig) -> Self
	where
		B: StorageBackend + 'static,
	{
		let mut store = Self::new(backend, config.namespace.clone());
		store.default_ttl = config.default_ttl_secs.map(Duration::from_secs);
		store
	}

	/// Expiry applied by [`set`](Self::set)
	pub fn with_default_ttl(mut self, ttl: Option<Duration>) -> Self {
		self.default_ttl = ttl;
		self
	}

	/// Replace the clock (milliseconds since the Unix epoch)
	pub fn with_clock<F>(mut self, clock: F) -> Self
	where
		F: Fn() -> u64 + 'static,
	{
		self.clock = Rc::new(clock);
		self
	}

	/// Namespace of this store
	pub fn namespace(&self) -> &str {
		&self.namespace
	}

	/// Default expiry of this store
	pub fn default_ttl(&self) -> Option<Duration> {
		self.default_ttl
	}

	/// Backend key of `key`
	pub fn namespaced_key(&self, key: &str) -> String {
		format!("{}:{}", self.namespace, key)
	}

	pub(crate) fn now(&self) -> u64 {
		(self.clock)()
	}

	/// Write a value with the default expiry
	pub fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
		self.set_with_expiry(key, value, self.default_ttl)
	}

	/// Write a value expiring after `ttl` (never, if `None`)
	pub fn set_with_expiry(
		&self,
		key: &str,
		value: &Value,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let full_key = self.namespaced_key(key);
		let json = value
			.to_json()
			.map_err(|source| StorageError::Serialization {
				key: full_key.clone(),
				source,
			})?;
		let raw = Envelope::new(json, self.now(), ttl.map(duration_ms)).encode(&full_key)?;
		self.backend.set_item(&full_key, &raw)?;
		tracing::trace!(target: logging::STORAGE, key = %full_key, bytes = raw.len(), "entry written");
		Ok(())
	}

	/// Read a value; expired entries are removed and read as `None`
	pub fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
		let full_key = self.namespaced_key(key);
		let Some(raw) = self.backend.get_item(&full_key)? else {
			return Ok(None);
		};
		let envelope = Envelope::decode(&full_key, &raw)?;
		if envelope.is_expired(self.now()) {
			tracing::debug!(target: logging::STORAGE, key = %full_key, "evicting expired entry");
			self.backend.remove_item(&full_key)?;
			return Ok(None);
		}
		Ok(Some(Value::from(envelope.value)))
	}

	/// Delete a value
	pub fn remove(&self, key: &str) -> Result<(), StorageError> {
		self.backend.remove_item(&self.namespaced_key(key))
	}

	/// Whether a live (unexpired) value is stored under `key`
	pub fn has(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.get(key)?.is_some())
	}

	/// Keys of this namespace, without the prefix
	pub fn keys(&self) -> Result<Vec<String>, StorageError> {
		let prefix = format!("{}:", self.namespace);
		Ok(self
			.backend
			.keys()?
			.into_iter()
			.filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
			.collect())
	}

	/// Delete every key of this namespace; other namespaces are left alone
	pub fn clear(&self) -> Result<(), StorageError> {
		for key in self.keys()? {
			self.remove(&key)?;
		}
		Ok(())
	}
}

impl fmt::Debug for PersistentStore {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("PersistentStore")
			.field("namespace", &self.namespace)
			.field("default_ttl", &self.default_ttl)
			.finish()
	}
}
