#![doc(html_root_url = "https://docs.rs/cart-counter-dom/0.1.0")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Keeps storefront cart counter badges in sync with the cart.
//!
//! A [`CartSyncController`] debounces refresh triggers into single requests against a [`CartProvider`],
//! applies the results to every counter instance on the page and shares them with other tabs through a [`LocalCache`].
//!
//! All environment access goes through the [`host`] traits. [`web`] implements them for browsers, [`memory`] without one.

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod memory;
pub mod provider;
pub mod renderer;
pub mod snapshot;
pub mod web;

pub use cache::LocalCache;
pub use config::SyncConfig;
pub use controller::{CartSyncController, Host, SyncPhase, SyncState};
pub use error::{SyncError, SyncResult};
pub use provider::{CartProvider, FetchRequest, FnProvider};
pub use renderer::{CounterRenderer, CounterSurface};
pub use snapshot::CartSnapshot;
