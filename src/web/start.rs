use super::{events::listen, AjaxProvider, DomEvents, DomSurface, DomWatcher, JsClock, WebStorage, WindowTimers};
use crate::{
	config::{SyncConfig, DEFAULT_GLOBAL_NAME},
	controller::{CartSyncController, Host},
	error::{SyncError, SyncResult},
	host::Subscription,
};
use std::{cell::RefCell, rc::Rc};
use tracing::{error, info};
use wasm_bindgen::{prelude::wasm_bindgen, JsValue};
use web_sys::Element;

pub type DomController = CartSyncController<Element>;

/// Starts synchronizing the counters of the current page, configured by `window.wooCartCounter`.
///
/// Call this once the document has been parsed, since counters present at that time are read for the initial count.
///
/// An unreadable configuration object, or one without endpoint or token, still starts: the cache and
/// cross-tab updates keep working, but nothing is fetched.
///
/// # Errors
///
/// Iff there is no `window` or `document`.
pub fn start() -> SyncResult<DomController> {
	let config = SyncConfig::from_window(DEFAULT_GLOBAL_NAME).unwrap_or_else(|error| {
		error!(%error, "Unreadable configuration; cart refreshes are disabled.");
		SyncConfig::default()
	});
	start_with(config)
}

/// [`start`] with an explicit configuration.
///
/// # Errors
///
/// Iff there is no `window` or `document`.
pub fn start_with(config: SyncConfig) -> SyncResult<DomController> {
	let window = web_sys::window().ok_or_else(|| SyncError::Configuration("no `window`".to_owned()))?;
	let document = window.document().ok_or_else(|| SyncError::Configuration("no `document`".to_owned()))?;

	let host = Host::new(
		Rc::new(AjaxProvider::new()),
		Rc::new(WindowTimers::new(window.clone())),
		Rc::new(JsClock),
		Rc::new(WebStorage::local(&window)),
		Rc::new(DomEvents::new(window, document.clone())),
		Rc::new(DomSurface::new(document.clone(), config.selectors.clone())),
	)
	.with_watcher(Rc::new(DomWatcher::new(document, config.selectors.counter.clone())));

	let controller = CartSyncController::initialize(config, host);
	info!(fetch_enabled = controller.is_fetch_enabled(), "Cart counter started.");
	Ok(controller)
}

/// Script-facing handle of a started (or, before `DOMContentLoaded`, starting) controller.
#[wasm_bindgen]
pub struct CartCounterHandle {
	controller: Rc<RefCell<Option<DomController>>>,
	ready: RefCell<Option<Subscription>>,
}

#[wasm_bindgen]
impl CartCounterHandle {
	#[wasm_bindgen(js_name = scheduleUpdate)]
	pub fn schedule_update(&self) {
		if let Some(controller) = &*self.controller.borrow() {
			controller.schedule_update();
		}
	}

	/// Fetches without waiting for the debounce period.
	#[wasm_bindgen(js_name = refreshNow)]
	pub fn refresh_now(&self) {
		if let Some(controller) = &*self.controller.borrow() {
			controller.fetch_and_apply();
		}
	}

	pub fn teardown(&self) {
		drop(self.ready.borrow_mut().take());
		if let Some(controller) = self.controller.borrow_mut().take() {
			controller.teardown();
		}
	}
}

/// Starts right away, or on `DOMContentLoaded` while the document is still loading.
///
/// # Errors
///
/// Iff there is no `window` or `document`, or waiting for `DOMContentLoaded` is impossible.
#[wasm_bindgen(js_name = startCartCounter)]
pub fn start_cart_counter() -> Result<CartCounterHandle, JsValue> {
	#[cfg(feature = "console-tracing")]
	{
		static TRACING: std::sync::Once = std::sync::Once::new();
		TRACING.call_once(tracing_wasm::set_as_global_default);
	}

	let document = web_sys::window()
		.and_then(|window| window.document())
		.ok_or_else(|| JsValue::from_str("cart-counter-dom: no `document`"))?;

	let handle = CartCounterHandle {
		controller: Rc::default(),
		ready: RefCell::new(None),
	};

	let slot = Rc::clone(&handle.controller);
	let start_into = move || match start() {
		Ok(controller) => *slot.borrow_mut() = Some(controller),
		Err(error) => error!(%error, "Could not start cart counter."),
	};

	if document.ready_state() == "loading" {
		let start_into = RefCell::new(Some(start_into));
		let subscription = listen(
			&document,
			"DOMContentLoaded",
			Box::new(move |_: web_sys::Event| {
				if let Some(start_into) = start_into.borrow_mut().take() {
					start_into();
				}
			}),
		)
		.map_err(|error| JsValue::from_str(&error.to_string()))?;
		*handle.ready.borrow_mut() = Some(subscription);
	} else {
		start_into();
	}

	Ok(handle)
}
