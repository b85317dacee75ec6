//! Stored entry format
//!
//! Every entry is a JSON document:
//!
//! ```json
//! {"value": {"todos": []}, "timestamp": 1718000000000, "expires": 1718003600000}
//! ```
//!
//! Timestamps are milliseconds since the Unix epoch. `expires` is omitted for
//! entries that never expire.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// A stored value with its write time and optional expiry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
	/// Stored value
	pub value: serde_json::Value,
	/// Write time in milliseconds since the Unix epoch
	pub timestamp: u64,
	/// Expiry in milliseconds since the Unix epoch
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires: Option<u64>,
}

impl Envelope {
	/// Wrap a value written at `now`, expiring `ttl_ms` later if given
	pub fn new(value: serde_json::Value, now: u64, ttl_ms: Option<u64>) -> Self {
		Self {
			value,
			timestamp: now,
			expires: ttl_ms.map(|ttl| now.saturating_add(ttl)),
		}
	}

	/// Whether the entry is expired at `now`
	pub fn is_expired(&self, now: u64) -> bool {
		self.expires.is_some_and(|expires| now >= expires)
	}

	/// Parse a stored entry; `key` is only used in the error
	pub fn decode(key: &str, raw: &str) -> Result<Self, StorageError> {
		serde_json::from_str(raw).map_err(|source| StorageError::Envelope {
			key: key.to_string(),
			source,
		})
	}

	/// Serialize for storage; `key` is only used in the error
	pub fn encode(&self, key: &str) -> Result<String, StorageError> {
		serde_json::to_string(self).map_err(|source| StorageError::Envelope {
			key: key.to_string(),
			source,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;
	use serde_json::json;

	#[rstest]
	fn test_envelope_without_expiry_omits_field() {
		let envelope = Envelope::new(json!({"a": 1}), 1_000, None);
		let raw = envelope.encode("app:k").unwrap();

		assert_eq!(
			serde_json::from_str::<serde_json::Value>(&raw).unwrap(),
			json!({"value": {"a": 1}, "timestamp": 1000})
		);
	}

	#[rstest]
	#[case(1_999, false)]
	#[case(2_000, true)]
	#[case(5_000, true)]
	fn test_expiry(#[case] now: u64, #[case] expired: bool) {
		let envelope = Envelope::new(json!(null), 1_000, Some(1_000));
		assert_eq!(envelope.is_expired(now), expired);
	}

	#[rstest]
	#[case("not json")]
	#[case(r#"{"value": 1}"#)]
	fn test_malformed_envelope(#[case] raw: &str) {
		assert!(matches!(
			Envelope::decode("app:k", raw),
			Err(StorageError::Envelope { key, .. }) if key == "app:k"
		));
	}
}
