//! Async state - observable request status with supersede and abort
//!
//! [`AsyncState`] exposes `data`, `error` and `loading` keys on a [`State`].
//! Each [`execute`](AsyncState::execute) call starts a new request and aborts
//! the signal of the previous one. Only the latest request may write its
//! result; an older request that resolves late is dropped silently.
//!
//! ## Example
//!
//! ```ignore
//! use reinhardt_state_core::async_state::AsyncState;
//!
//! let user = AsyncState::new();
//! effect({
//!     let user = user.clone();
//!     move || render(user.loading(), user.data())
//! });
//!
//! user.execute(|signal| async move {
//!     api::fetch_user(42, signal).await.map_err(Into::into)
//! }).await?;
//! ```

use core::cell::{Cell, RefCell};
use core::fmt;
use std::future::Future;
use std::rc::Rc;

use crate::error::{AsyncStateError, BoxError};
use crate::logging;
use crate::reactive::{Map, Runtime, State, Value};

const DATA: &str = "data";
const ERROR: &str = "error";
const LOADING: &str = "loading";

/// Cancellation flag handed to a request
///
/// Requests should check [`is_aborted`](Self::is_aborted) at their own
/// suspension points; nothing is interrupted forcibly.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
	aborted: Rc<Cell<bool>>,
}

impl AbortSignal {
	/// Whether the request was cancelled
	pub fn is_aborted(&self) -> bool {
		self.aborted.get()
	}
}

/// Owner side of an [`AbortSignal`]
#[derive(Debug, Clone, Default)]
pub struct AbortController {
	signal: AbortSignal,
}

impl AbortController {
	/// Create a controller whose signal is not yet aborted
	pub fn new() -> Self {
		Self::default()
	}

	/// Signal observed by the request
	pub fn signal(&self) -> AbortSignal {
		self.signal.clone()
	}

	/// Cancel the request
	pub fn abort(&self) {
		self.signal.aborted.set(true);
	}
}

/// How a request that resolved without error ended
#[derive(Debug, Clone, PartialEq)]
pub enum AsyncOutcome {
	/// The result was written to `data`
	Applied(Value),
	/// A newer request started meanwhile; the result was dropped
	Superseded,
}

struct Inner {
	runtime: Runtime,
	state: State,
	sequence: Cell<u64>,
	controller: RefCell<Option<AbortController>>,
}

/// Observable state of an async request
///
/// Clones share the same request slot.
#[derive(Clone)]
pub struct AsyncState {
	inner: Rc<Inner>,
}

impl AsyncState {
	/// Create an idle request state on the thread's default runtime
	pub fn new() -> Self {
		Self::new_in(&Runtime::current())
	}

	/// Create an idle request state on the given runtime
	pub fn new_in(runtime: &Runtime) -> Self {
		let state = State::new_in(runtime, Self::idle());
		Self {
			inner: Rc::new(Inner {
				runtime: runtime.clone(),
				state,
				sequence: Cell::new(0),
				controller: RefCell::new(None),
			}),
		}
	}

	fn idle() -> Map {
		Map::from([
			(DATA.to_string(), Value::Null),
			(ERROR.to_string(), Value::Null),
			(LOADING.to_string(), Value::Bool(false)),
		])
	}

	/// Underlying observable object
	pub fn state(&self) -> &State {
		&self.inner.state
	}

	/// Latest applied result (tracked)
	pub fn data(&self) -> Value {
		self.inner.state.get(DATA)
	}

	/// Message of the latest failure (tracked)
	pub fn error(&self) -> Option<String> {
		self.inner.state.get(ERROR).as_str().map(str::to_string)
	}

	/// Whether a request is in flight (tracked)
	pub fn loading(&self) -> bool {
		self.inner.state.get(LOADING).as_bool().unwrap_or(false)
	}

	/// Sequence number of the latest request
	pub fn sequence(&self) -> u64 {
		self.inner.sequence.get()
	}

	/// Run a request, superseding any request still in flight
	///
	/// `loading` is set and `error` cleared before `request` is awaited. When
	/// the future resolves and no newer request has started, its value goes
	/// to `data` (or its message to `error`) and `loading` is cleared.
	pub async fn execute<F, Fut>(&self, request: F) -> Result<AsyncOutcome, AsyncStateError>
	where
		F: FnOnce(AbortSignal) -> Fut,
		Fut: Future<Output = Result<Value, BoxError>>,
	{
		let controller = AbortController::new();
		if let Some(previous) = self.inner.controller.replace(Some(controller.clone())) {
			previous.abort();
		}
		let sequence = self.inner.sequence.get() + 1;
		self.inner.sequence.set(sequence);

		let state = &self.inner.state;
		self.inner.runtime.batch(|| {
			state.set(LOADING, true);
			state.set(ERROR, Value::Null);
		});
		tracing::debug!(target: logging::HELPERS, sequence, "async request started");

		let signal = controller.signal();
		let result = request(signal.clone()).await;

		if self.inner.sequence.get() != sequence {
			tracing::debug!(target: logging::HELPERS, sequence, "dropping superseded async result");
			return Ok(AsyncOutcome::Superseded);
		}
		self.inner.controller.replace(None);

		if signal.is_aborted() {
			state.set(LOADING, false);
			return Err(AsyncStateError::Aborted);
		}

		match result {
			Ok(value) => {
				self.inner.runtime.batch(|| {
					state.set(DATA, value.clone());
					state.set(LOADING, false);
				});
				Ok(AsyncOutcome::Applied(value))
			}
			Err(err) => {
				let message = err.to_string();
				tracing::warn!(target: logging::HELPERS, sequence, error = %message, "async request failed");
				self.inner.runtime.batch(|| {
					state.set(ERROR, message.as_str());
					state.set(LOADING, false);
				});
				Err(AsyncStateError::Failed(message))
			}
		}
	}

	/// Cancel the request in flight, if any
	///
	/// The request keeps running until it checks its signal; its result is
	/// discarded and `loading` is cleared when it resolves.
	pub fn abort(&self) {
		if let Some(controller) = self.inner.controller.borrow().as_ref() {
			controller.abort();
		}
	}

	/// Abort any request in flight and return to the idle state
	pub fn reset(&self) {
		if let Some(controller) = self.inner.controller.take() {
			controller.abort();
		}
		// A request still in flight resolves as superseded.
		self.inner.sequence.set(self.inner.sequence.get() + 1);
		let state = &self.inner.state;
		self.inner.runtime.batch(|| {
			for (key, value) in Self::idle() {
				state.set(&key, value);
			}
		});
	}
}

impl Default for AsyncState {
	fn default() -> Self {
		Self::new()
	}
}

impl fmt::Debug for AsyncState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("AsyncState")
			.field("sequence", &self.sequence())
			.field("loading", &self.inner.state.get_untracked(LOADING))
			.finish()
	}
}
