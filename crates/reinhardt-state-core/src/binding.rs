//! Element binding helpers
//!
//! Bindings connect observable state to page elements without depending on a
//! DOM crate. The host implements [`ElementSink`] over its element API (for
//! example `web-sys`), and [`bind`] keeps the resolved element in step with
//! the reads made by the render closure.
//!
//! ```ignore
//! use reinhardt_state_core::binding::{Binding, bind};
//!
//! let counter = state(json!({"count": 0, "busy": false}));
//! let _label = bind(sink.clone(), "#count", {
//!     let counter = counter.clone();
//!     move || {
//!         Binding::new()
//!             .text(counter.get("count").as_i64().unwrap_or(0).to_string())
//!             .class("busy", counter.get("busy").as_bool() == Some(true))
//!     }
//! });
//! ```

use std::rc::Rc;

use crate::logging;
use crate::reactive::{EffectHandle, Runtime, Value};

/// Host-side access to page elements
pub trait ElementSink {
	/// Element handle returned by [`resolve`](Self::resolve)
	type Element: Clone;

	/// Find the element matching `selector`
	fn resolve(&self, selector: &str) -> Option<Self::Element>;

	/// Assign an element property such as `textContent` or `value`
	fn set_property(&self, element: &Self::Element, name: &str, value: &Value);

	/// Add or remove a CSS class
	fn set_class(&self, element: &Self::Element, class: &str, enabled: bool);

	/// Write a `data-*` attribute; `None` removes it
	fn set_data(&self, element: &Self::Element, name: &str, value: Option<&str>);

	/// Write an inline style property; `None` removes it
	fn set_style(&self, element: &Self::Element, name: &str, value: Option<&str>);
}

/// A single change applied to an element
#[derive(Debug, Clone, PartialEq)]
pub enum BindingUpdate {
	Property { name: String, value: Value },
	Class { class: String, enabled: bool },
	Data { name: String, value: Option<String> },
	Style { name: String, value: Option<String> },
}

/// Updates produced by one render of a binding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Binding {
	updates: Vec<BindingUpdate>,
}

impl Binding {
	pub fn new() -> Self {
		Self::default()
	}

	/// Set `textContent`
	pub fn text(self, text: impl Into<String>) -> Self {
		self.property("textContent", Value::String(text.into()))
	}

	/// Set an element property
	pub fn property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
		self.updates.push(BindingUpdate::Property {
			name: name.into(),
			value: value.into(),
		});
		self
	}

	/// Toggle a class
	pub fn class(mut self, class: impl Into<String>, enabled: bool) -> Self {
		self.updates.push(BindingUpdate::Class {
			class: class.into(),
			enabled,
		});
		self
	}

	/// Set or remove a `data-*` attribute
	pub fn data(mut self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
		self.updates.push(BindingUpdate::Data {
			name: name.into(),
			value: value.map(Into::into),
		});
		self
	}

	/// Set or remove an inline style property
	pub fn style(mut self, name: impl Into<String>, value: Option<impl Into<String>>) -> Self {
		self.updates.push(BindingUpdate::Style {
			name: name.into(),
			value: value.map(Into::into),
		});
		self
	}

	pub fn updates(&self) -> &[BindingUpdate] {
		&self.updates
	}

	pub fn is_empty(&self) -> bool {
		self.updates.is_empty()
	}

	fn apply<S: ElementSink + ?Sized>(&self, sink: &S, element: &S::Element) {
		for update in &self.updates {
			match update {
				BindingUpdate::Property { name, value } => sink.set_property(element, name, value),
				BindingUpdate::Class { class, enabled } => sink.set_class(element, class, *enabled),
				BindingUpdate::Data { name, value } => sink.set_data(element, name, value.as_deref()),
				BindingUpdate::Style { name, value } => {
					sink.set_style(element, name, value.as_deref())
				}
			}
		}
	}
}

impl Runtime {
	/// Re-apply `render` to the element matching `selector` whenever its reads change
	///
	/// The selector is resolved on every run, so an element that appears later
	/// is picked up by the next update.
	pub fn bind<S, F>(&self, sink: Rc<S>, selector: &str, mut render: F) -> EffectHandle
	where
		S: ElementSink + ?Sized + 'static,
		F: FnMut() -> Binding + 'static,
	{
		let selector = selector.to_string();
		self.effect(move || {
			// Render first so the reads are tracked even while the element is missing.
			let binding = render();
			let Some(element) = sink.resolve(&selector) else {
				tracing::warn!(target: logging::BINDING, selector = %selector, "binding target not found");
				return;
			};
			binding.apply(sink.as_ref(), &element);
			tracing::trace!(
				target: logging::BINDING,
				selector = %selector,
				updates = binding.updates().len(),
				"binding applied"
			);
		})
	}

	/// Keep the text of `selector` equal to `text()`
	pub fn bind_text<S, F>(&self, sink: Rc<S>, selector: &str, mut text: F) -> EffectHandle
	where
		S: ElementSink + ?Sized + 'static,
		F: FnMut() -> String + 'static,
	{
		self.bind(sink, selector, move || Binding::new().text(text()))
	}
}

/// Bind on the thread's default runtime
pub fn bind<S, F>(sink: Rc<S>, selector: &str, render: F) -> EffectHandle
where
	S: ElementSink + ?Sized + 'static,
	F: FnMut() -> Binding + 'static,
{
	Runtime::current().bind(sink, selector, render)
}

/// Bind text on the thread's default runtime
pub fn bind_text<S, F>(sink: Rc<S>, selector: &str, text: F) -> EffectHandle
where
	S: ElementSink + ?Sized + 'static,
	F: FnMut() -> String + 'static,
{
	Runtime::current().bind_text(sink, selector, text)
}
