use crate::{
	error::{describe_js, SyncError, SyncResult},
	provider::{parse_response, CartProvider, FetchCallback, FetchRequest, UPDATE_ACTION},
	snapshot::CartSnapshot,
};
use std::{cell::RefCell, rc::Rc};
use tracing::{debug, instrument};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::XmlHttpRequest;

type Handlers = Rc<RefCell<Option<[Closure<dyn FnMut()>; 3]>>>;
type Done = Rc<RefCell<Option<FetchCallback>>>;

/// Posts `action=woo_cart_counter_update&nonce=…` to the endpoint with an [***XMLHttpRequest***](https://developer.mozilla.org/en-US/docs/Web/API/XMLHttpRequest).
#[derive(Debug, Clone, Copy, Default)]
pub struct AjaxProvider;

impl AjaxProvider {
	#[must_use]
	pub fn new() -> Self {
		Self
	}
}

/// `application/x-www-form-urlencoded` request body.
#[must_use]
pub fn form_body(request: &FetchRequest) -> String {
	format!("action={}&nonce={}", UPDATE_ACTION, String::from(js_sys::encode_uri_component(&request.auth_token)))
}

impl CartProvider for AjaxProvider {
	#[instrument(skip(self, request, done), fields(endpoint = request.endpoint.as_str()))]
	fn fetch_snapshot(&self, request: &FetchRequest, done: FetchCallback) {
		let done: Done = Rc::new(RefCell::new(Some(done)));
		let handlers: Handlers = Rc::default();
		if let Err(error) = send(request, &done, &handlers) {
			handlers.borrow_mut().take();
			finish(&done, Err(SyncError::Transport(describe_js(&error))));
		}
	}
}

fn send(request: &FetchRequest, done: &Done, handlers: &Handlers) -> Result<(), JsValue> {
	let xhr = XmlHttpRequest::new()?;
	xhr.open_with_async("POST", &request.endpoint, true)?;
	xhr.set_request_header("Content-Type", "application/x-www-form-urlencoded")?;

	let handler = |outcome: fn(&XmlHttpRequest) -> SyncResult<CartSnapshot>| {
		let xhr = xhr.clone();
		let done = Rc::clone(done);
		let handlers = Rc::clone(handlers);
		Closure::wrap(Box::new(move || {
			let result = outcome(&xhr);
			xhr.set_onload(None);
			xhr.set_onerror(None);
			xhr.set_onabort(None);
			// Deferred until this handler returns.
			drop(handlers.borrow_mut().take());
			finish(&done, result);
		}) as Box<dyn FnMut()>)
	};
	let onload = handler(loaded);
	let onerror = handler(|_| Err(SyncError::Transport("request failed".to_owned())));
	let onabort = handler(|_| Err(SyncError::Transport("request aborted".to_owned())));

	xhr.set_onload(Some(onload.as_ref().unchecked_ref()));
	xhr.set_onerror(Some(onerror.as_ref().unchecked_ref()));
	xhr.set_onabort(Some(onabort.as_ref().unchecked_ref()));
	*handlers.borrow_mut() = Some([onload, onerror, onabort]);

	xhr.send_with_opt_str(Some(form_body(request).as_str()))
}

fn loaded(xhr: &XmlHttpRequest) -> SyncResult<CartSnapshot> {
	let status = xhr.status().map_err(|error| SyncError::Transport(describe_js(&error)))?;
	if !(200..300).contains(&status) {
		return Err(SyncError::Transport(format!("HTTP status {}", status)));
	}
	match xhr.response_text() {
		Ok(Some(body)) => parse_response(&body),
		Ok(None) => Err(SyncError::MalformedResponse("empty body".to_owned())),
		Err(error) => Err(SyncError::Transport(describe_js(&error))),
	}
}

fn finish(done: &Done, result: SyncResult<CartSnapshot>) {
	let done = done.borrow_mut().take();
	match done {
		Some(done) => done(result),
		None => debug!("Request completed twice."),
	}
}
