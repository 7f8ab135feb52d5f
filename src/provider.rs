//! The storefront endpoint that knows the authoritative cart.

use crate::{
	error::{SyncError, SyncResult},
	snapshot::CartSnapshot,
};
use serde::Deserialize;
use serde_json::Value;

/// `action` parameter the storefront routes refresh requests by.
pub const UPDATE_ACTION: &str = "woo_cart_counter_update";

/// Everything a provider needs for one refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
	pub endpoint: String,
	pub auth_token: String,
}

/// Completion callback of [`CartProvider::fetch_snapshot`]. Called exactly once.
pub type FetchCallback = Box<dyn FnOnce(SyncResult<CartSnapshot>)>;

pub trait CartProvider {
	/// Starts fetching the current cart. `done` may be called synchronously.
	fn fetch_snapshot(&self, request: &FetchRequest, done: FetchCallback);
}

/// Adapts a closure, for hosts that fetch carts their own way.
pub struct FnProvider<F>(pub F);

impl<F: Fn(&FetchRequest, FetchCallback)> CartProvider for FnProvider<F> {
	fn fetch_snapshot(&self, request: &FetchRequest, done: FetchCallback) {
		(self.0)(request, done);
	}
}

#[derive(Deserialize)]
struct Envelope {
	success: bool,
	#[serde(default)]
	data: Value,
}

/// Parses a refresh response body: `{"success":true,"data":{"count":3,"total":"…","fragments":{…}}}`.
///
/// Extra fields in `data` are ignored.
///
/// # Errors
///
/// [`SyncError::Rejected`] for `success: false`, [`SyncError::MalformedResponse`] for anything else that isn't a snapshot.
pub fn parse_response(body: &str) -> SyncResult<CartSnapshot> {
	let envelope: Envelope = serde_json::from_str(body)?;
	if !envelope.success {
		let message = envelope.data.get("message").and_then(Value::as_str).unwrap_or("no message").to_owned();
		return Err(SyncError::Rejected(message));
	}
	if !envelope.data.is_object() {
		return Err(SyncError::MalformedResponse("`data` is not an object".to_owned()));
	}
	let mut snapshot: CartSnapshot = serde_json::from_value(envelope.data)?;
	snapshot.timestamp = None;
	Ok(snapshot)
}
