use thiserror::Error;
use wasm_bindgen::JsValue;

/// Everything that can go wrong while keeping counters in sync.
///
/// None of these ever reach page-level callers of [`CartSyncController`](`crate::CartSyncController`):
/// they are logged where they occur and the counters keep showing the last known good value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
	/// The request could not be completed, or completed with a non-success HTTP status.
	#[error("transport error: {0}")]
	Transport(String),

	/// The provider answered, but not with a cart snapshot.
	#[error("malformed response: {0}")]
	MalformedResponse(String),

	/// The provider answered `success: false`, usually because the auth token expired.
	#[error("request rejected: {0}")]
	Rejected(String),

	/// [***Storage***](https://developer.mozilla.org/en-US/docs/Web/API/Storage) is disabled or full.
	#[error("storage unavailable: {0}")]
	StorageUnavailable(String),

	/// Missing endpoint or auth token.
	#[error("configuration error: {0}")]
	Configuration(String),
}

impl From<serde_json::Error> for SyncError {
	fn from(error: serde_json::Error) -> Self {
		Self::MalformedResponse(error.to_string())
	}
}

/// Describes a thrown [***JavaScript***](https://developer.mozilla.org/en-US/docs/Web/JavaScript) value.
///
/// Callers pick the variant, since the same exception means different things in different places.
pub(crate) fn describe_js(value: &JsValue) -> String {
	value
		.as_string()
		.or_else(|| js_sys::Reflect::get(value, &JsValue::from_str("message")).ok().and_then(|message| message.as_string()))
		.unwrap_or_else(|| format!("{:?}", value))
}

pub type SyncResult<T> = Result<T, SyncError>;
