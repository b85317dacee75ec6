//! Value - Dynamic values stored in reactive objects
//!
//! A [`State`] stores [`Value`]s under string keys. Plain data (`Null`, `Bool`,
//! `Number`, `String`, `Array`) is compared by value. Nested records start out
//! as a plain [`Value::Map`] and are replaced by a wrapped [`Value::Object`] the
//! first time they are read through their parent, so repeated reads return the
//! identical wrapper.
//!
//! [`Value::Opaque`] carries platform values (timestamps, handles, error
//! objects, channels...) that must never be wrapped. They are compared by
//! identity and cannot be serialized.

use core::fmt;
use std::any::Any;
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::error::ValueError;

use super::state::State;

/// Plain record of values, ordered by key.
pub type Map = BTreeMap<String, Value>;

/// A dynamic value held by a reactive object.
#[derive(Debug, Clone, Default)]
pub enum Value {
	/// Absent or empty value.
	#[default]
	Null,
	/// Boolean.
	Bool(bool),
	/// Number (all numbers are `f64`, as in JSON).
	Number(f64),
	/// UTF-8 string.
	String(String),
	/// List of values, compared element-wise.
	Array(Vec<Value>),
	/// Plain record that has not been wrapped yet.
	Map(Map),
	/// Reactive object.
	Object(State),
	/// Platform value passed through unwrapped.
	Opaque(Opaque),
}

/// A platform value that the reactive layer stores but never wraps.
#[derive(Clone)]
pub struct Opaque {
	type_name: &'static str,
	value: Rc<dyn Any>,
}

impl Opaque {
	/// Wrap any value as an opaque handle.
	pub fn new<T: Any>(value: T) -> Self {
		Self {
			type_name: std::any::type_name::<T>(),
			value: Rc::new(value),
		}
	}

	/// Borrow the inner value if it has type `T`.
	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.value.downcast_ref::<T>()
	}

	/// Type name of the wrapped value.
	pub fn type_name(&self) -> &'static str {
		self.type_name
	}

	/// Whether both handles point to the same value.
	pub fn ptr_eq(&self, other: &Self) -> bool {
		Rc::ptr_eq(&self.value, &other.value)
	}
}

impl fmt::Debug for Opaque {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Opaque").field(&self.type_name).finish()
	}
}

impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Self::Null, Self::Null) => true,
			(Self::Bool(a), Self::Bool(b)) => a == b,
			// Same-value semantics: NaN equals NaN so re-assigning NaN is a no-op
			(Self::Number(a), Self::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
			(Self::String(a), Self::String(b)) => a == b,
			(Self::Array(a), Self::Array(b)) => a == b,
			(Self::Map(a), Self::Map(b)) => a == b,
			(Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
			(Self::Opaque(a), Self::Opaque(b)) => a.ptr_eq(b),
			_ => false,
		}
	}
}

impl Value {
	/// Short name of the variant, used in diagnostics.
	pub fn type_name(&self) -> &'static str {
		match self {
			Self::Null => "null",
			Self::Bool(_) => "bool",
			Self::Number(_) => "number",
			Self::String(_) => "string",
			Self::Array(_) => "array",
			Self::Map(_) => "map",
			Self::Object(_) => "object",
			Self::Opaque(_) => "opaque",
		}
	}

	/// Whether the value is `Null`.
	pub fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}

	/// Whether the value is a reactive object.
	pub fn is_reactive(&self) -> bool {
		matches!(self, Self::Object(_))
	}

	/// Boolean content, if any.
	pub fn as_bool(&self) -> Option<bool> {
		match self {
			Self::Bool(b) => Some(*b),
			_ => None,
		}
	}

	/// Numeric content, if any.
	pub fn as_f64(&self) -> Option<f64> {
		match self {
			Self::Number(n) => Some(*n),
			_ => None,
		}
	}

	/// Numeric content when it is a whole number.
	pub fn as_i64(&self) -> Option<i64> {
		match self {
			Self::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
			_ => None,
		}
	}

	/// String content, if any.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => Some(s),
			_ => None,
		}
	}

	/// Array content, if any.
	pub fn as_array(&self) -> Option<&[Value]> {
		match self {
			Self::Array(items) => Some(items),
			_ => None,
		}
	}

	/// Plain map content, if the value has not been wrapped.
	pub fn as_map(&self) -> Option<&Map> {
		match self {
			Self::Map(map) => Some(map),
			_ => None,
		}
	}

	/// Reactive object, if any.
	pub fn as_state(&self) -> Option<&State> {
		match self {
			Self::Object(state) => Some(state),
			_ => None,
		}
	}

	/// Opaque platform value, if any.
	pub fn as_opaque(&self) -> Option<&Opaque> {
		match self {
			Self::Opaque(opaque) => Some(opaque),
			_ => None,
		}
	}

	/// Deep plain copy: reactive objects are replaced by their raw data.
	///
	/// Reads nothing through the tracking layer.
	pub fn to_raw(&self) -> Value {
		match self {
			Self::Object(state) => state.to_raw(),
			Self::Array(items) => Self::Array(items.iter().map(Value::to_raw).collect()),
			Self::Map(map) => Self::Map(
				map.iter()
					.map(|(key, value)| (key.clone(), value.to_raw()))
					.collect(),
			),
			other => other.clone(),
		}
	}

	/// Deep plain copy read through the tracking layer, so the current
	/// subscriber depends on every key it visits.
	pub(crate) fn snapshot(&self) -> Value {
		match self {
			Self::Object(state) => state.snapshot(),
			Self::Array(items) => Self::Array(items.iter().map(Value::snapshot).collect()),
			Self::Map(map) => Self::Map(
				map.iter()
					.map(|(key, value)| (key.clone(), value.snapshot()))
					.collect(),
			),
			other => other.clone(),
		}
	}

	/// Convert to JSON. Fails on opaque values.
	pub fn to_json(&self) -> Result<serde_json::Value, ValueError> {
		use serde_json::Value as Json;

		Ok(match self {
			Self::Null => Json::Null,
			Self::Bool(b) => Json::Bool(*b),
			Self::Number(n) => number_to_json(*n),
			Self::String(s) => Json::String(s.clone()),
			Self::Array(items) => Json::Array(
				items
					.iter()
					.map(Value::to_json)
					.collect::<Result<Vec<_>, _>>()?,
			),
			Self::Map(map) => Json::Object(
				map.iter()
					.map(|(key, value)| Ok((key.clone(), value.to_json()?)))
					.collect::<Result<serde_json::Map<String, Json>, ValueError>>()?,
			),
			Self::Object(state) => state.to_raw().to_json()?,
			Self::Opaque(opaque) => {
				return Err(ValueError::NotSerializable {
					type_name: opaque.type_name(),
				});
			}
		})
	}

	/// Parse a JSON document into a plain value.
	pub fn from_json_str(source: &str) -> Result<Value, serde_json::Error> {
		serde_json::from_str::<serde_json::Value>(source).map(Value::from)
	}
}

fn number_to_json(n: f64) -> serde_json::Value {
	// Whole numbers round-trip as integers; non-finite numbers become null like JSON.stringify
	const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
	if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
		return serde_json::Value::from(n as i64);
	}
	serde_json::Number::from_f64(n)
		.map(serde_json::Value::Number)
		.unwrap_or(serde_json::Value::Null)
}

impl From<serde_json::Value> for Value {
	fn from(json: serde_json::Value) -> Self {
		use serde_json::Value as Json;

		match json {
			Json::Null => Self::Null,
			Json::Bool(b) => Self::Bool(b),
			Json::Number(n) => Self::Number(n.as_f64().unwrap_or_default()),
			Json::String(s) => Self::String(s),
			Json::Array(items) => Self::Array(items.into_iter().map(Value::from).collect()),
			Json::Object(map) => Self::Map(
				map.into_iter()
					.map(|(key, value)| (key, Value::from(value)))
					.collect(),
			),
		}
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Self::Bool(value)
	}
}

macro_rules! impl_from_number {
	($($ty:ty),*) => {
		$(
			impl From<$ty> for Value {
				fn from(value: $ty) -> Self {
					Self::Number(value as f64)
				}
			}
		)*
	};
}

impl_from_number!(i8, i16, i32, i64, u8, u16, u32, u64, usize, isize, f32, f64);

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Self::String(value.to_string())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Self::String(value)
	}
}

impl From<&String> for Value {
	fn from(value: &String) -> Self {
		Self::String(value.clone())
	}
}

impl From<Map> for Value {
	fn from(value: Map) -> Self {
		Self::Map(value)
	}
}

impl From<State> for Value {
	fn from(value: State) -> Self {
		Self::Object(value)
	}
}

impl From<&State> for Value {
	fn from(value: &State) -> Self {
		Self::Object(value.clone())
	}
}

impl From<Opaque> for Value {
	fn from(value: Opaque) -> Self {
		Self::Opaque(value)
	}
}

impl<T: Into<Value>> From<Vec<T>> for Value {
	fn from(items: Vec<T>) -> Self {
		Self::Array(items.into_iter().map(Into::into).collect())
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(value: Option<T>) -> Self {
		value.map_or(Self::Null, Into::into)
	}
}
