//! Controller configuration, usually localized into the page by the storefront.

use crate::error::{SyncError, SyncResult};
use core::convert::TryFrom;
use serde::{Deserialize, Deserializer};
use tracing::warn;

/// Debounce delays outside this range are clamped.
pub const UPDATE_DELAY_RANGE_MS: core::ops::RangeInclusive<u32> = 100..=5000;

pub const DEFAULT_UPDATE_DELAY_MS: u32 = 1000;

pub const DEFAULT_AJAX_ENABLED: bool = true;

/// Well-known cross-tab cache key.
pub const DEFAULT_STORAGE_KEY: &str = "woo_cart_counter_data";

/// Name of the global object the storefront localizes the configuration into.
pub const DEFAULT_GLOBAL_NAME: &str = "wooCartCounter";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
	/// URL the [`AjaxProvider`](`crate::web::AjaxProvider`) posts to.
	#[serde(alias = "ajax_url", alias = "ajaxUrl", alias = "fetchEndpoint")]
	pub fetch_endpoint: Option<String>,

	/// Opaque token (a nonce) sent along with each refresh request.
	#[serde(alias = "nonce", alias = "authToken")]
	pub auth_token: Option<String>,

	#[serde(alias = "enable_ajax", alias = "enableAjax", alias = "ajaxEnabled", deserialize_with = "loose_bool")]
	pub ajax_enabled: bool,

	#[serde(alias = "update_delay", alias = "updateDelay", alias = "updateDelayMs", deserialize_with = "loose_u32")]
	pub update_delay_ms: u32,

	pub selectors: Selectors,
	pub classes: StateClasses,

	#[serde(alias = "storageKey")]
	pub storage_key: String,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			fetch_endpoint: None,
			auth_token: None,
			ajax_enabled: DEFAULT_AJAX_ENABLED,
			update_delay_ms: DEFAULT_UPDATE_DELAY_MS,
			selectors: Selectors::default(),
			classes: StateClasses::default(),
			storage_key: DEFAULT_STORAGE_KEY.to_owned(),
		}
	}
}

impl SyncConfig {
	#[must_use]
	pub fn new(fetch_endpoint: impl Into<String>, auth_token: impl Into<String>) -> Self {
		Self {
			fetch_endpoint: Some(fetch_endpoint.into()),
			auth_token: Some(auth_token.into()),
			..Self::default()
		}
	}

	/// Parses the JSON form of the localized configuration object.
	///
	/// # Errors
	///
	/// Iff `json` isn't an object of the expected shape.
	pub fn from_json(json: &str) -> SyncResult<Self> {
		serde_json::from_str::<Self>(json)
			.map(Self::normalized)
			.map_err(|error| SyncError::Configuration(error.to_string()))
	}

	/// Reads `window[global_name]`. A missing global yields the defaults (which then fail [validation](`SyncConfig::validate`)).
	///
	/// # Errors
	///
	/// Iff there is no `window` or the global can't be serialized into a valid configuration.
	pub fn from_window(global_name: &str) -> SyncResult<Self> {
		let window = web_sys::window().ok_or_else(|| SyncError::Configuration("no `window`".to_owned()))?;
		let global = js_sys::Reflect::get(&window, &global_name.into()).map_err(|error| SyncError::Configuration(crate::error::describe_js(&error)))?;
		if global.is_undefined() || global.is_null() {
			warn!(global_name, "Localized configuration object not found; using defaults.");
			return Ok(Self::default());
		}
		let json = js_sys::JSON::stringify(&global).map_err(|error| SyncError::Configuration(crate::error::describe_js(&error)))?;
		Self::from_json(&String::from(json))
	}

	/// Clamps values into their recognized ranges.
	#[must_use]
	pub fn normalized(mut self) -> Self {
		let clamped = self.update_delay_ms.max(*UPDATE_DELAY_RANGE_MS.start()).min(*UPDATE_DELAY_RANGE_MS.end());
		if clamped != self.update_delay_ms {
			warn!(requested = self.update_delay_ms, clamped, "Update delay out of range.");
			self.update_delay_ms = clamped;
		}
		self
	}

	/// # Errors
	///
	/// [`SyncError::Configuration`] iff the endpoint or auth token is missing or empty.
	pub fn validate(&self) -> SyncResult<()> {
		fn present(value: &Option<String>) -> bool {
			value.as_deref().map_or(false, |value| !value.trim().is_empty())
		}

		if !present(&self.fetch_endpoint) {
			return Err(SyncError::Configuration("missing fetch endpoint".to_owned()));
		}
		if !present(&self.auth_token) {
			return Err(SyncError::Configuration("missing auth token".to_owned()));
		}
		Ok(())
	}
}

/// CSS selectors of the markup contract with the counter templates.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Selectors {
	pub counter: String,
	pub count: String,
	pub total: String,
}

impl Default for Selectors {
	fn default() -> Self {
		Self {
			counter: ".woo-cart-counter".to_owned(),
			count: ".woo-cart-counter-count".to_owned(),
			total: ".woo-cart-counter-total".to_owned(),
		}
	}
}

/// State classes toggled on counter root elements.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StateClasses {
	pub empty: String,
	pub increase: String,
	pub decrease: String,
}

impl Default for StateClasses {
	fn default() -> Self {
		Self {
			empty: "woo-cart-counter-empty".to_owned(),
			increase: "woo-cart-counter-increase".to_owned(),
			decrease: "woo-cart-counter-decrease".to_owned(),
		}
	}
}

/// Localized scalars arrive as strings, so `"1"`, `""` and `"yes"` all have to work.
///
/// Values that still make no sense fall back to the field's default.
#[derive(Deserialize)]
#[serde(untagged)]
enum Loose {
	Bool(bool),
	Unsigned(u64),
	Float(f64),
	Text(String),
}

fn loose_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
	Ok(match Option::<Loose>::deserialize(deserializer)? {
		Some(Loose::Bool(value)) => value,
		Some(Loose::Unsigned(value)) => value != 0,
		#[allow(clippy::float_cmp)]
		Some(Loose::Float(value)) => value != 0.0,
		Some(Loose::Text(text)) => match text.trim().to_ascii_lowercase().as_str() {
			"1" | "true" | "yes" | "on" => true,
			"" | "0" | "false" | "no" | "off" => false,
			other => {
				warn!(value = other, default = DEFAULT_AJAX_ENABLED, "Unrecognized flag; using the default.");
				DEFAULT_AJAX_ENABLED
			}
		},
		None => DEFAULT_AJAX_ENABLED,
	})
}

/// Negative and fractional delays truncate towards zero, like `setTimeout` does.
/// [`SyncConfig::normalized`] then clamps them into [`UPDATE_DELAY_RANGE_MS`].
fn loose_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
	let value = match Option::<Loose>::deserialize(deserializer)? {
		Some(Loose::Unsigned(value)) => Some(u32::try_from(value).unwrap_or(u32::MAX)),
		Some(Loose::Float(value)) => delay_from_f64(value),
		Some(Loose::Text(text)) => text.trim().parse().ok().and_then(delay_from_f64),
		Some(Loose::Bool(_)) | None => None,
	};
	Ok(value.unwrap_or_else(|| {
		warn!(default = DEFAULT_UPDATE_DELAY_MS, "Unreadable update delay; using the default.");
		DEFAULT_UPDATE_DELAY_MS
	}))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn delay_from_f64(value: f64) -> Option<u32> {
	if value.is_nan() {
		None
	} else {
		// `as` saturates.
		Some(value as u32)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn localized_strings() {
		let config = SyncConfig::from_json(r#"{"ajax_url":"/wp-admin/admin-ajax.php","nonce":"abc","enable_ajax":"","update_delay":"250"}"#).unwrap();
		assert_eq!(config.fetch_endpoint.as_deref(), Some("/wp-admin/admin-ajax.php"));
		assert_eq!(config.auth_token.as_deref(), Some("abc"));
		assert!(!config.ajax_enabled);
		assert_eq!(config.update_delay_ms, 250);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn camel_case_and_defaults() {
		let config = SyncConfig::from_json(r#"{"ajaxUrl":"/ajax","nonce":"n","enableAjax":true}"#).unwrap();
		assert!(config.ajax_enabled);
		assert_eq!(config.update_delay_ms, DEFAULT_UPDATE_DELAY_MS);
		assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
		assert_eq!(config.selectors.counter, ".woo-cart-counter");
	}

	#[test]
	fn delay_is_clamped() {
		assert_eq!(SyncConfig::from_json(r#"{"update_delay":10}"#).unwrap().update_delay_ms, 100);
		assert_eq!(SyncConfig::from_json(r#"{"update_delay":"60000"}"#).unwrap().update_delay_ms, 5000);
	}

	#[test]
	fn missing_token_is_a_configuration_error() {
		let config = SyncConfig::from_json(r#"{"ajax_url":"/ajax","nonce":"  "}"#).unwrap();
		assert!(matches!(config.validate(), Err(SyncError::Configuration(_))));
		assert!(matches!(SyncConfig::default().validate(), Err(SyncError::Configuration(_))));
	}

	#[test]
	fn negative_and_fractional_delays_are_clamped() {
		let config = SyncConfig::from_json(r#"{"ajax_url":"/wp-admin/admin-ajax.php","nonce":"abc","enable_ajax":"1","update_delay":-1}"#).unwrap();
		assert!(config.ajax_enabled);
		assert_eq!(config.update_delay_ms, 100);
		assert!(config.validate().is_ok());

		assert_eq!(SyncConfig::from_json(r#"{"update_delay":"1000.5"}"#).unwrap().update_delay_ms, 1000);
		assert_eq!(SyncConfig::from_json(r#"{"update_delay":2500.9}"#).unwrap().update_delay_ms, 2500);
		assert_eq!(SyncConfig::from_json(r#"{"update_delay":"-30"}"#).unwrap().update_delay_ms, 100);
	}

	#[test]
	fn unreadable_scalars_fall_back_to_defaults() {
		let config = SyncConfig::from_json(r#"{"enable_ajax":"maybe","update_delay":"soon"}"#).unwrap();
		assert_eq!(config.ajax_enabled, DEFAULT_AJAX_ENABLED);
		assert_eq!(config.update_delay_ms, DEFAULT_UPDATE_DELAY_MS);

		let config = SyncConfig::from_json(r#"{"enable_ajax":null,"update_delay":null}"#).unwrap();
		assert_eq!(config.ajax_enabled, DEFAULT_AJAX_ENABLED);
		assert_eq!(config.update_delay_ms, DEFAULT_UPDATE_DELAY_MS);
	}
}
