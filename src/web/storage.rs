use crate::{
	error::{describe_js, SyncError, SyncResult},
	host::Storage,
};
use tracing::debug;
use web_sys::Window;

/// [***localStorage***](https://developer.mozilla.org/en-US/docs/Web/API/Window/localStorage), if the browser allows it.
#[derive(Debug, Clone)]
pub struct WebStorage(Option<web_sys::Storage>);

impl WebStorage {
	/// Accessing `localStorage` throws when storage is disabled. That only makes this instance unavailable.
	#[must_use]
	pub fn local(window: &Window) -> Self {
		match window.local_storage() {
			Ok(storage) => Self(storage),
			Err(error) => {
				debug!(error = %describe_js(&error), "`localStorage` is unavailable.");
				Self(None)
			}
		}
	}

	fn storage(&self) -> SyncResult<&web_sys::Storage> {
		self.0.as_ref().ok_or_else(|| SyncError::StorageUnavailable("no `localStorage`".to_owned()))
	}
}

impl Storage for WebStorage {
	fn get_item(&self, key: &str) -> SyncResult<Option<String>> {
		self.storage()?.get_item(key).map_err(|error| SyncError::StorageUnavailable(describe_js(&error)))
	}

	fn set_item(&self, key: &str, value: &str) -> SyncResult<()> {
		self.storage()?.set_item(key, value).map_err(|error| SyncError::StorageUnavailable(describe_js(&error)))
	}
}
