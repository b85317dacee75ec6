//! Reactive collections
//!
//! A [`Collection`] keeps a list of items under the `items` key of a
//! [`State`]. Every mutation replaces the array in one write, so subscribers
//! reading the list run once per mutation.

use crate::reactive::{Runtime, State, Value};

const ITEMS: &str = "items";

/// Observable list of values
#[derive(Clone, Debug)]
pub struct Collection {
	state: State,
}

impl Collection {
	/// Create a collection in the thread's default runtime
	pub fn new<I, T>(items: I) -> Self
	where
		I: IntoIterator<Item = T>,
		T: Into<Value>,
	{
		Self::new_in(&Runtime::current(), items)
	}

	/// Create a collection in the given runtime
	pub fn new_in<I, T>(runtime: &Runtime, items: I) -> Self
	where
		I: IntoIterator<Item = T>,
		T: Into<Value>,
	{
		let state = runtime.state(crate::reactive::Map::new());
		let items: Vec<Value> = items.into_iter().map(Into::into).collect();
		state.set(ITEMS, Value::Array(items));
		Self { state }
	}

	/// Underlying object; the list lives under `items`
	pub fn state(&self) -> &State {
		&self.state
	}

	/// Current items (tracked)
	pub fn items(&self) -> Vec<Value> {
		match self.state.get(ITEMS) {
			Value::Array(items) => items,
			_ => Vec::new(),
		}
	}

	fn items_untracked(&self) -> Vec<Value> {
		match self.state.get_untracked(ITEMS) {
			Value::Array(items) => items,
			_ => Vec::new(),
		}
	}

	fn replace(&self, items: Vec<Value>) -> bool {
		self.state.set(ITEMS, Value::Array(items))
	}

	/// Number of items (tracked)
	pub fn len(&self) -> usize {
		self.items().len()
	}

	/// Whether the list is empty (tracked)
	pub fn is_empty(&self) -> bool {
		self.items().is_empty()
	}

	/// Item at `index` (tracked)
	pub fn at(&self, index: usize) -> Option<Value> {
		self.items().into_iter().nth(index)
	}

	/// Append an item
	pub fn push(&self, item: impl Into<Value>) {
		let mut items = self.items_untracked();
		items.push(item.into());
		self.replace(items);
	}

	/// Append several items in one notification
	pub fn extend<I, T>(&self, new_items: I)
	where
		I: IntoIterator<Item = T>,
		T: Into<Value>,
	{
		let mut items = self.items_untracked();
		let before = items.len();
		items.extend(new_items.into_iter().map(Into::into));
		if items.len() != before {
			self.replace(items);
		}
	}

	/// Insert an item at `index`, clamped to the end of the list
	pub fn insert(&self, index: usize, item: impl Into<Value>) {
		let mut items = self.items_untracked();
		let index = index.min(items.len());
		items.insert(index, item.into());
		self.replace(items);
	}

	/// Remove every item matching `predicate`; returns how many were removed
	pub fn remove_where(&self, mut predicate: impl FnMut(&Value) -> bool) -> usize {
		let mut items = self.items_untracked();
		let before = items.len();
		items.retain(|item| !predicate(item));
		let removed = before - items.len();
		if removed > 0 {
			self.replace(items);
		}
		removed
	}

	/// Replace every item matching `predicate` with `update(item)`; returns how
	/// many matched
	pub fn update_where<U>(
		&self,
		mut predicate: impl FnMut(&Value) -> bool,
		mut update: impl FnMut(&Value) -> U,
	) -> usize
	where
		U: Into<Value>,
	{
		let mut matched = 0;
		let items = self
			.items_untracked()
			.into_iter()
			.map(|item| {
				if predicate(&item) {
					matched += 1;
					update(&item).into()
				} else {
					item
				}
			})
			.collect();
		if matched > 0 {
			self.replace(items);
		}
		matched
	}

	/// First item matching `predicate` (tracked)
	pub fn find(&self, mut predicate: impl FnMut(&Value) -> bool) -> Option<Value> {
		self.items().into_iter().find(|item| predicate(item))
	}

	/// Items matching `predicate` (tracked)
	pub fn filter(&self, mut predicate: impl FnMut(&Value) -> bool) -> Vec<Value> {
		self.items()
			.into_iter()
			.filter(|item| predicate(item))
			.collect()
	}

	/// Remove every item
	pub fn clear(&self) {
		self.replace(Vec::new());
	}

	/// Flip the boolean `field` of every matching record; returns how many
	/// were flipped
	///
	/// Plain records are replaced by a copy with the flipped field. Reactive
	/// records are written in place, which notifies readers of that field only.
	pub fn toggle(&self, mut predicate: impl FnMut(&Value) -> bool, field: &str) -> usize {
		let mut flipped = 0;
		let mut plain_changed = false;
		let mut items = self.items_untracked();

		for item in items.iter_mut() {
			if !predicate(item) {
				continue;
			}
			match item {
				Value::Object(record) => {
					let current = record.get_untracked(field).as_bool().unwrap_or(false);
					record.set(field, !current);
					flipped += 1;
				}
				Value::Map(record) => {
					let current = record.get(field).and_then(Value::as_bool).unwrap_or(false);
					record.insert(field.to_string(), Value::Bool(!current));
					plain_changed = true;
					flipped += 1;
				}
				_ => {}
			}
		}

		if plain_changed {
			self.replace(items);
		}
		flipped
	}
}
