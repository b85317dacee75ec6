//! Storage backends

use core::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::StorageError;

/// String key/value store used by [`PersistentStore`](super::PersistentStore)
///
/// Mirrors the Web Storage API. Implementations for `localStorage` or
/// `sessionStorage` live in the host crate.
pub trait StorageBackend {
	/// Read an entry
	fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

	/// Write an entry
	fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

	/// Delete an entry; deleting a missing key is not an error
	fn remove_item(&self, key: &str) -> Result<(), StorageError>;

	/// All keys currently stored
	fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// In-memory backend with an optional byte quota
///
/// Clones share the same entries, which makes it easy to simulate two tabs
/// over one store in tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
	entries: Rc<RefCell<BTreeMap<String, String>>>,
	quota: Option<usize>,
}

impl MemoryStorage {
	/// Create an unbounded store
	pub fn new() -> Self {
		Self::default()
	}

	/// Create a store holding at most `bytes` bytes of keys and values
	pub fn with_quota(bytes: usize) -> Self {
		Self {
			entries: Rc::default(),
			quota: Some(bytes),
		}
	}

	/// Bytes used by keys and values
	pub fn used_bytes(&self) -> usize {
		self.entries
			.borrow()
			.iter()
			.map(|(key, value)| key.len() + value.len())
			.sum()
	}

	/// Number of entries
	pub fn len(&self) -> usize {
		self.entries.borrow().len()
	}

	/// Whether the store is empty
	pub fn is_empty(&self) -> bool {
		self.entries.borrow().is_empty()
	}
}

impl StorageBackend for MemoryStorage {
	fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
		Ok(self.entries.borrow().get(key).cloned())
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
		if let Some(quota) = self.quota {
			let replaced = self
				.entries
				.borrow()
				.get(key)
				.map(|old| key.len() + old.len())
				.unwrap_or(0);
			let available = quota.saturating_sub(self.used_bytes() - replaced);
			let required = key.len() + value.len();
			if required > available {
				return Err(StorageError::QuotaExceeded {
					key: key.to_string(),
					required,
					available,
				});
			}
		}
		self.entries
			.borrow_mut()
			.insert(key.to_string(), value.to_string());
		Ok(())
	}

	fn remove_item(&self, key: &str) -> Result<(), StorageError> {
		self.entries.borrow_mut().remove(key);
		Ok(())
	}

	fn keys(&self) -> Result<Vec<String>, StorageError> {
		Ok(self.entries.borrow().keys().cloned().collect())
	}
}
