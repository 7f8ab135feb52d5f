use crate::{
	error::{describe_js, SyncError, SyncResult},
	host::{PageEvents, Subscription},
	snapshot::CartSnapshot,
};
use js_sys::{Function, Reflect};
use std::rc::Rc;
use tracing::{trace, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{CustomEvent, CustomEventInit, Document, EventTarget, StorageEvent, Window};

/// Attaches `handler` to `target` until the returned [`Subscription`] is dropped.
pub(crate) fn listen(target: &EventTarget, event_name: &str, handler: Box<dyn Fn(web_sys::Event)>) -> SyncResult<Subscription> {
	let closure = Closure::wrap(handler);
	target
		.add_event_listener_with_callback(event_name, closure.as_ref().unchecked_ref())
		.map_err(|error| SyncError::Configuration(describe_js(&error)))?;

	let target = target.clone();
	let event_name = event_name.to_owned();
	Ok(Subscription::new(move || {
		if let Err(error) = target.remove_event_listener_with_callback(&event_name, closure.as_ref().unchecked_ref()) {
			warn!(event_name = event_name.as_str(), error = %describe_js(&error), "Could not remove listener.");
		}
	}))
}

/// Page events of a browser window.
///
/// The storefront triggers its cart events through jQuery, which never dispatches them natively.
/// If `window.jQuery` exists, named subscriptions therefore go through `jQuery(document).on(…)`,
/// which also sees native events. Otherwise they are plain `document` listeners.
#[derive(Debug, Clone)]
pub struct DomEvents {
	window: Window,
	document: Document,
}

impl DomEvents {
	#[must_use]
	pub fn new(window: Window, document: Document) -> Self {
		Self { window, document }
	}

	fn jquery(&self) -> Option<Function> {
		Reflect::get(&self.window, &JsValue::from_str("jQuery")).ok()?.dyn_into::<Function>().ok()
	}

	fn jquery_subscribe(&self, jquery: &Function, event_name: &str, handler: Rc<dyn Fn()>) -> Result<Subscription, JsValue> {
		let wrapped = jquery.call1(&JsValue::UNDEFINED, &self.document)?;
		let method = |name: &str| -> Result<Function, JsValue> { Reflect::get(&wrapped, &JsValue::from_str(name))?.dyn_into::<Function>().map_err(JsValue::from) };

		let closure = Closure::wrap(Box::new(move || handler()) as Box<dyn Fn()>);
		method("on")?.call2(&wrapped, &JsValue::from_str(event_name), closure.as_ref())?;

		let off = method("off")?;
		let event_name = event_name.to_owned();
		Ok(Subscription::new(move || {
			if let Err(error) = off.call2(&wrapped, &JsValue::from_str(&event_name), closure.as_ref()) {
				warn!(event_name = event_name.as_str(), error = %describe_js(&error), "Could not remove jQuery handler.");
			}
		}))
	}
}

impl PageEvents for DomEvents {
	fn subscribe(&self, event_name: &str, handler: Rc<dyn Fn()>) -> SyncResult<Subscription> {
		if let Some(jquery) = self.jquery() {
			trace!(event_name, "Subscribing through jQuery.");
			return self
				.jquery_subscribe(&jquery, event_name, handler)
				.map_err(|error| SyncError::Configuration(describe_js(&error)));
		}
		listen(&self.document, event_name, Box::new(move |_: web_sys::Event| handler()))
	}

	fn subscribe_visible(&self, handler: Rc<dyn Fn()>) -> SyncResult<Subscription> {
		let document = self.document.clone();
		listen(
			&self.document,
			"visibilitychange",
			Box::new(move |_: web_sys::Event| {
				if !document.hidden() {
					handler();
				}
			}),
		)
	}

	fn subscribe_storage(&self, handler: Rc<dyn Fn(&str, Option<&str>)>) -> SyncResult<Subscription> {
		listen(
			&self.window,
			"storage",
			Box::new(move |event: web_sys::Event| {
				let event = match event.dyn_into::<StorageEvent>() {
					Ok(event) => event,
					Err(_) => return,
				};
				// `localStorage.clear()` has no key.
				if let Some(key) = event.key() {
					handler(&key, event.new_value().as_deref());
				}
			}),
		)
	}

	/// Dispatches a bubbling, cancelable [***CustomEvent***](https://developer.mozilla.org/en-US/docs/Web/API/CustomEvent) on `document` with the snapshot as `detail`.
	fn publish(&self, event_name: &str, snapshot: &CartSnapshot) {
		let detail = match serde_json::to_string(snapshot).map_err(|error| error.to_string()).and_then(|json| js_sys::JSON::parse(&json).map_err(|error| describe_js(&error))) {
			Ok(detail) => detail,
			Err(error) => return warn!(event_name, %error, "Could not convert snapshot for publishing."),
		};

		let mut init = CustomEventInit::new();
		init.bubbles(true).cancelable(true).detail(&detail);
		let event = match CustomEvent::new_with_event_init_dict(event_name, &init) {
			Ok(event) => event,
			Err(error) => return warn!(event_name, error = %describe_js(&error), "Could not create event."),
		};
		if let Err(error) = self.document.dispatch_event(&event) {
			warn!(event_name, error = %describe_js(&error), "Could not dispatch event.");
		}
	}
}
