//! Reactive forms
//!
//! A [`Form`] keeps field values, error messages and touched flags in three
//! observable objects, plus a `status` object carrying `is_submitting`,
//! `submit_count` and the computed `is_valid` / `is_dirty` flags. Views bind to
//! these objects like to any other [`State`].
//!
//! ## Validation flow
//!
//! - `touch(field)` marks a field as touched and validates it.
//! - `set_value(field, ..)` re-validates touched fields only, so errors do not
//!   show up while a user is still typing into a fresh field.
//! - `validate()` touches and validates every field that has validators.
//! - `submit(handler)` validates, then hands a plain copy of the values to the
//!   async handler while `is_submitting` is set.
//!
//! ## Example
//!
//! ```ignore
//! use reinhardt_state_core::form::{Form, validators};
//! use serde_json::json;
//!
//! let form = Form::new(json!({"email": "", "password": ""}))
//!     .with_validator("email", validators::required("Email is required"))
//!     .with_validator("password", validators::min_length(8, "Too short"));
//!
//! form.set_value("email", "ada@example.com");
//! let result = form.submit(|values| async move {
//!     api::login(values).await.map_err(Into::into)
//! }).await;
//! ```

use core::cell::RefCell;
use core::fmt;
use std::collections::BTreeMap;
use std::future::Future;
use std::rc::Rc;

use crate::error::{BoxError, FormError};
use crate::logging;
use crate::reactive::{EffectHandle, Map, Runtime, State, Value};

/// Field validator: receives the field value and the whole values object
///
/// Returns `Err(message)` when the value is invalid.
pub type Validator = Rc<dyn Fn(&Value, &State) -> Result<(), String>>;

const IS_SUBMITTING: &str = "is_submitting";
const SUBMIT_COUNT: &str = "submit_count";
const IS_VALID: &str = "is_valid";
const IS_DIRTY: &str = "is_dirty";

/// Observable form state with per-field validators
pub struct Form {
	runtime: Runtime,
	initial: Map,
	values: State,
	errors: State,
	touched: State,
	status: State,
	validators: RefCell<BTreeMap<String, Vec<Validator>>>,
	derived: Vec<EffectHandle>,
}

impl Form {
	/// Create a form on the thread's default runtime
	pub fn new(initial: impl Into<Value>) -> Self {
		Self::new_in(&Runtime::current(), initial)
	}

	/// Create a form on the given runtime
	///
	/// `initial` must be a map of field names to values; anything else yields a
	/// form without fields.
	pub fn new_in(runtime: &Runtime, initial: impl Into<Value>) -> Self {
		let initial = match initial.into().to_raw() {
			Value::Map(map) => map,
			other => {
				tracing::warn!(
					target: logging::HELPERS,
					type_name = other.type_name(),
					"form initial values must be a map"
				);
				Map::new()
			}
		};

		let values = runtime.state(initial.clone());
		let errors = runtime.state(Map::new());
		let touched = runtime.state(Map::new());
		let status = runtime.state(Map::from([
			(IS_SUBMITTING.to_string(), Value::Bool(false)),
			(SUBMIT_COUNT.to_string(), Value::from(0)),
		]));

		let errors_source = errors.clone();
		let is_valid = runtime.computed(&status, IS_VALID, move |_| {
			errors_source
				.snapshot()
				.as_map()
				.is_none_or(|errors| errors.values().all(Value::is_null))
		});

		let values_source = values.clone();
		let baseline = Value::Map(initial.clone());
		let is_dirty = runtime.computed(&status, IS_DIRTY, move |_| {
			values_source.snapshot() != baseline
		});

		Self {
			runtime: runtime.clone(),
			initial,
			values,
			errors,
			touched,
			status,
			validators: RefCell::new(BTreeMap::new()),
			derived: vec![is_valid, is_dirty],
		}
	}

	/// Add a validator for `field` (builder style)
	pub fn with_validator<F>(self, field: &str, validator: F) -> Self
	where
		F: Fn(&Value, &State) -> Result<(), String> + 'static,
	{
		self.add_validator(field, validator);
		self
	}

	/// Add a validator for `field`; validators run in the order they were added
	pub fn add_validator<F>(&self, field: &str, validator: F)
	where
		F: Fn(&Value, &State) -> Result<(), String> + 'static,
	{
		self.validators
			.borrow_mut()
			.entry(field.to_string())
			.or_default()
			.push(Rc::new(validator));
	}

	/// Field values
	pub fn values(&self) -> &State {
		&self.values
	}

	/// Error message per field (`Null` when valid)
	pub fn errors(&self) -> &State {
		&self.errors
	}

	/// Touched flag per field
	pub fn touched(&self) -> &State {
		&self.touched
	}

	/// `is_submitting`, `submit_count`, `is_valid` and `is_dirty`
	pub fn status(&self) -> &State {
		&self.status
	}

	/// Current value of a field (tracked)
	pub fn value(&self, field: &str) -> Value {
		self.values.get(field)
	}

	/// Write a field, re-validating it if it was touched
	pub fn set_value(&self, field: &str, value: impl Into<Value>) -> bool {
		self.runtime.batch(|| {
			let changed = self.values.set(field, value);
			if changed && self.is_touched(field) {
				self.validate_field(field);
			}
			changed
		})
	}

	fn is_touched(&self, field: &str) -> bool {
		self.touched.get_untracked(field).as_bool() == Some(true)
	}

	/// Mark a field as touched and validate it
	pub fn touch(&self, field: &str) {
		self.runtime.batch(|| {
			self.touched.set(field, true);
			self.validate_field(field);
		});
	}

	/// Set the error message of a field
	pub fn set_error(&self, field: &str, message: impl Into<String>) {
		self.errors.set(field, message.into());
	}

	/// Clear the error message of a field
	pub fn clear_error(&self, field: &str) {
		if self.errors.contains_key_untracked(field) {
			self.errors.set(field, Value::Null);
		}
	}

	/// Error message of a field (tracked)
	pub fn error(&self, field: &str) -> Option<String> {
		self.errors.get(field).as_str().map(str::to_string)
	}

	/// Run the validators of one field; the first failure becomes its error
	pub fn validate_field(&self, field: &str) -> bool {
		let validators = self
			.validators
			.borrow()
			.get(field)
			.cloned()
			.unwrap_or_default();
		if validators.is_empty() {
			return true;
		}

		let value = self.values.get_untracked(field);
		let failure = self.runtime.untrack(|| {
			validators
				.iter()
				.find_map(|validator| validator(&value, &self.values).err())
		});

		match failure {
			Some(message) => {
				self.set_error(field, message);
				false
			}
			None => {
				self.clear_error(field);
				true
			}
		}
	}

	/// Touch and validate every field that has validators
	///
	/// Returns whether the whole form is valid afterwards, errors set manually
	/// with [`set_error`](Self::set_error) included.
	pub fn validate(&self) -> bool {
		let fields: Vec<String> = self.validators.borrow().keys().cloned().collect();
		self.runtime.batch(|| {
			for field in &fields {
				self.touched.set(field, true);
				self.validate_field(field);
			}
		});
		self.invalid_fields().is_empty()
	}

	fn invalid_fields(&self) -> Vec<String> {
		self.runtime.untrack(|| {
			self.errors
				.keys()
				.into_iter()
				.filter(|field| !self.errors.get(field).is_null())
				.collect()
		})
	}

	/// Whether no field carries an error (tracked)
	pub fn is_valid(&self) -> bool {
		self.status.get(IS_VALID).as_bool().unwrap_or(true)
	}

	/// Whether the values differ from the initial ones (tracked)
	pub fn is_dirty(&self) -> bool {
		self.status.get(IS_DIRTY).as_bool().unwrap_or(false)
	}

	/// Whether a submission is in flight (tracked)
	pub fn is_submitting(&self) -> bool {
		self.status.get(IS_SUBMITTING).as_bool().unwrap_or(false)
	}

	/// Number of submissions that reached the handler (tracked)
	pub fn submit_count(&self) -> u64 {
		self.status
			.get(SUBMIT_COUNT)
			.as_i64()
			.and_then(|count| u64::try_from(count).ok())
			.unwrap_or(0)
	}

	/// Restore the initial values and clear errors and touched flags
	pub fn reset(&self) {
		self.runtime.batch(|| {
			for key in self.values.keys_untracked() {
				if !self.initial.contains_key(&key) {
					self.values.remove(&key);
				}
			}
			for (key, value) in &self.initial {
				self.values.set(key, value.clone());
			}
			for key in self.errors.keys_untracked() {
				self.errors.remove(&key);
			}
			for key in self.touched.keys_untracked() {
				self.touched.remove(&key);
			}
		});
	}

	/// Validate, then run `handler` with a plain copy of the values
	///
	/// `is_submitting` is set while the handler runs. A second call while a
	/// submission is in flight fails with [`FormError::AlreadySubmitting`].
	pub async fn submit<F, Fut>(&self, handler: F) -> Result<(), FormError>
	where
		F: FnOnce(Value) -> Fut,
		Fut: Future<Output = Result<(), BoxError>>,
	{
		if self.status.get_untracked(IS_SUBMITTING).as_bool() == Some(true) {
			return Err(FormError::AlreadySubmitting);
		}
		if !self.validate() {
			let fields = self.invalid_fields();
			tracing::debug!(target: logging::HELPERS, ?fields, "form submission blocked by validation");
			return Err(FormError::Invalid { fields });
		}

		self.runtime.batch(|| {
			self.status.set(IS_SUBMITTING, true);
			let count = self.status.get_untracked(SUBMIT_COUNT).as_i64().unwrap_or(0);
			self.status.set(SUBMIT_COUNT, count + 1);
		});

		let result = handler(self.values.to_raw()).await;
		self.status.set(IS_SUBMITTING, false);

		result.map_err(|err| {
			tracing::warn!(target: logging::HELPERS, error = %err, "form submission failed");
			FormError::Submit(err.to_string())
		})
	}

	/// Dispose the derived `is_valid` / `is_dirty` properties
	pub fn dispose(&self) {
		for handle in &self.derived {
			handle.dispose();
		}
	}
}

impl fmt::Debug for Form {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Form")
			.field("fields", &self.initial.keys().collect::<Vec<_>>())
			.field("validated", &self.validators.borrow().keys().collect::<Vec<_>>())
			.finish()
	}
}

/// Common field validators
pub mod validators {
	use super::*;

	fn text_len(value: &Value) -> usize {
		value.as_str().map(|s| s.chars().count()).unwrap_or(0)
	}

	/// Fails on `Null`, empty strings and empty arrays
	pub fn required(message: impl Into<String>) -> impl Fn(&Value, &State) -> Result<(), String> {
		let message = message.into();
		move |value: &Value, _: &State| {
			let empty = match value {
				Value::Null => true,
				Value::String(s) => s.trim().is_empty(),
				Value::Array(items) => items.is_empty(),
				_ => false,
			};
			if empty { Err(message.clone()) } else { Ok(()) }
		}
	}

	/// Fails on strings shorter than `min` characters
	pub fn min_length(
		min: usize,
		message: impl Into<String>,
	) -> impl Fn(&Value, &State) -> Result<(), String> {
		let message = message.into();
		move |value: &Value, _: &State| {
			if text_len(value) < min {
				Err(message.clone())
			} else {
				Ok(())
			}
		}
	}

	/// Fails on strings longer than `max` characters
	pub fn max_length(
		max: usize,
		message: impl Into<String>,
	) -> impl Fn(&Value, &State) -> Result<(), String> {
		let message = message.into();
		move |value: &Value, _: &State| {
			if text_len(value) > max {
				Err(message.clone())
			} else {
				Ok(())
			}
		}
	}

	/// Fails unless the value equals the value of `other`
	pub fn matches_field(
		other: impl Into<String>,
		message: impl Into<String>,
	) -> impl Fn(&Value, &State) -> Result<(), String> {
		let other = other.into();
		let message = message.into();
		move |value: &Value, values: &State| {
			if *value == values.get(&other) {
				Ok(())
			} else {
				Err(message.clone())
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::executor::block_on;
	use rstest::rstest;
	use serde_json::json;

	fn login_form(rt: &Runtime) -> Form {
		Form::new_in(rt, json!({"email": "", "password": ""}))
			.with_validator("email", validators::required("Email is required"))
			.with_validator("password", validators::min_length(8, "Too short"))
	}

	#[rstest]
	fn test_untouched_fields_are_not_validated_on_input() {
		let rt = Runtime::new();
		let form = login_form(&rt);

		form.set_value("password", "abc");

		assert_eq!(form.error("password"), None);
		assert!(form.is_valid());
		assert!(form.is_dirty());
	}

	#[rstest]
	fn test_touch_validates_and_input_revalidates() {
		let rt = Runtime::new();
		let form = login_form(&rt);

		form.touch("password");
		assert_eq!(form.error("password"), Some("Too short".to_string()));
		assert!(!form.is_valid());

		form.set_value("password", "long enough");
		assert_eq!(form.error("password"), None);
		assert!(form.is_valid());
	}

	#[rstest]
	fn test_validate_touches_every_validated_field() {
		let rt = Runtime::new();
		let form = login_form(&rt);

		assert!(!form.validate());
		assert_eq!(form.touched().get("email"), Value::Bool(true));
		assert_eq!(form.touched().get("password"), Value::Bool(true));
	}

	#[rstest]
	fn test_reset_restores_initial_state() {
		let rt = Runtime::new();
		let form = login_form(&rt);
		form.set_value("email", "ada@example.com");
		form.set_value("extra", 1);
		form.validate();

		form.reset();

		assert!(!form.is_dirty());
		assert!(form.is_valid());
		assert_eq!(form.values().keys(), vec!["email", "password"]);
		assert!(form.touched().is_empty());
	}

	#[rstest]
	fn test_submit_invalid_form() {
		let rt = Runtime::new();
		let form = login_form(&rt);

		let result = block_on(form.submit(|_| async { Ok::<(), BoxError>(()) }));

		assert_eq!(
			result,
			Err(FormError::Invalid {
				fields: vec!["email".to_string(), "password".to_string()]
			})
		);
		assert_eq!(form.submit_count(), 0);
	}

	#[rstest]
	fn test_submit_passes_plain_values() {
		let rt = Runtime::new();
		let form = login_form(&rt);
		form.set_value("email", "ada@example.com");
		form.set_value("password", "correct horse");
		let received = Rc::new(RefCell::new(None));

		let received_clone = received.clone();
		let result = block_on(form.submit(|values| async move {
			*received_clone.borrow_mut() = Some(values.to_json()?);
			Ok::<(), BoxError>(())
		}));

		assert_eq!(result, Ok(()));
		assert_eq!(
			*received.borrow(),
			Some(json!({"email": "ada@example.com", "password": "correct horse"}))
		);
		assert!(!form.is_submitting());
		assert_eq!(form.submit_count(), 1);
	}

	#[rstest]
	fn test_submit_handler_error() {
		let rt = Runtime::new();
		let form = Form::new_in(&rt, json!({"name": "x"}));

		let result = block_on(form.submit(|_| async { Err::<(), BoxError>("server said no".into()) }));

		assert_eq!(result, Err(FormError::Submit("server said no".to_string())));
		assert!(!form.is_submitting());
	}

	#[rstest]
	fn test_matches_field_validator() {
		let rt = Runtime::new();
		let form = Form::new_in(&rt, json!({"password": "secret", "confirm": "other"}))
			.with_validator("confirm", validators::matches_field("password", "Mismatch"));

		assert!(!form.validate_field("confirm"));
		form.set_value("confirm", "secret");
		assert!(form.validate_field("confirm"));
	}
}
