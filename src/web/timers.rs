use crate::{
	error::describe_js,
	host::{Clock, TimerHandle, Timers},
};
use core::convert::TryFrom;
use hashbrown::HashMap;
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};
use tracing::{error, trace};
use wasm_bindgen::{closure::Closure, JsCast};
use web_sys::Window;

/// `setTimeout`/`clearTimeout` of a [***Window***](https://developer.mozilla.org/en-US/docs/Web/API/Window).
///
/// Each pending callback's [`Closure`] is kept alive here until it has run or was cleared.
#[derive(Debug)]
pub struct WindowTimers {
	window: Window,
	closures: Rc<RefCell<HashMap<i32, Closure<dyn FnMut()>>>>,
}

impl WindowTimers {
	#[must_use]
	pub fn new(window: Window) -> Self {
		Self {
			window,
			closures: Rc::default(),
		}
	}

	/// Number of callbacks that have neither run nor been cleared.
	#[must_use]
	pub fn pending_count(&self) -> usize {
		self.closures.borrow().len()
	}
}

impl Timers for WindowTimers {
	fn set_timeout(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> TimerHandle {
		let handle_slot = Rc::new(Cell::new(None::<i32>));
		let closures = Rc::downgrade(&self.closures);
		let mut callback = Some(callback);

		let closure = Closure::wrap(Box::new({
			let handle_slot = Rc::clone(&handle_slot);
			move || {
				let callback = callback.take();
				// Dropping a `Closure` while it runs is deferred until it returns.
				if let (Some(handle), Some(closures)) = (handle_slot.get(), closures.upgrade()) {
					drop(closures.borrow_mut().remove(&handle));
				}
				if let Some(callback) = callback {
					callback();
				}
			}
		}) as Box<dyn FnMut()>);

		let timeout = i32::try_from(delay_ms).unwrap_or(i32::MAX);
		match self.window.set_timeout_with_callback_and_timeout_and_arguments_0(closure.as_ref().unchecked_ref(), timeout) {
			Ok(handle) => {
				handle_slot.set(Some(handle));
				self.closures.borrow_mut().insert(handle, closure);
				trace!(handle, delay_ms, "Created timeout.");
				TimerHandle(handle)
			}
			Err(error) => {
				error!(error = %describe_js(&error), "Could not set timeout.");
				// Never a valid timeout handle.
				TimerHandle(0)
			}
		}
	}

	fn clear_timeout(&self, handle: TimerHandle) {
		self.window.clear_timeout_with_handle(handle.0);
		if self.closures.borrow_mut().remove(&handle.0).is_some() {
			trace!(handle = handle.0, "Cleared timeout.");
		}
	}
}

/// `Date.now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsClock;

impl Clock for JsClock {
	#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
	fn now_ms(&self) -> u64 {
		js_sys::Date::now() as u64
	}
}
