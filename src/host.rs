//! Capabilities the controller needs from its environment.
//!
//! Everything the synchronization core does to the outside world goes through these traits,
//! so that the same state machine drives the browser adapters in [`web`](`crate::web`)
//! and the in-memory ones in [`memory`](`crate::memory`).

use crate::{error::SyncResult, snapshot::CartSnapshot};
use core::fmt::{self, Debug, Formatter};
use std::rc::Rc;

/// Opaque identifier of a scheduled timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub i32);

pub trait Timers {
	/// Runs `callback` once after `delay_ms`, unless cleared first.
	fn set_timeout(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> TimerHandle;

	/// Clearing an expired or unknown handle does nothing.
	fn clear_timeout(&self, handle: TimerHandle);
}

/// Wall clock in milliseconds since the Unix epoch.
pub trait Clock {
	fn now_ms(&self) -> u64;
}

/// A string key/value store visible to all tabs of the same origin.
pub trait Storage {
	/// # Errors
	///
	/// Iff the storage is unavailable.
	fn get_item(&self, key: &str) -> SyncResult<Option<String>>;

	/// # Errors
	///
	/// Iff the storage is unavailable or full.
	fn set_item(&self, key: &str, value: &str) -> SyncResult<()>;
}

/// Named page notifications the controller reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
	ItemAdded,
	ItemRemoved,
	TotalsUpdated,
	CartPageRefreshed,
	CartTotalsRefreshed,
	/// Generic "please refresh" event for other page scripts.
	RequestUpdate,
	/// The storefront's own fragment refresh. It has already updated the DOM by the time this fires.
	FragmentsRefreshed,
}

impl Trigger {
	pub const ALL: [Self; 7] = [
		Self::ItemAdded,
		Self::ItemRemoved,
		Self::TotalsUpdated,
		Self::CartPageRefreshed,
		Self::CartTotalsRefreshed,
		Self::RequestUpdate,
		Self::FragmentsRefreshed,
	];

	#[must_use]
	pub fn event_name(self) -> &'static str {
		match self {
			Self::ItemAdded => "added_to_cart",
			Self::ItemRemoved => "removed_from_cart",
			Self::TotalsUpdated => "updated_cart_totals",
			Self::CartPageRefreshed => "cart_page_refreshed",
			Self::CartTotalsRefreshed => "cart_totals_refreshed",
			Self::RequestUpdate => "woo_cart_counter_update",
			Self::FragmentsRefreshed => "wc_fragments_refreshed",
		}
	}

	#[must_use]
	pub fn from_event_name(name: &str) -> Option<Self> {
		Self::ALL.iter().copied().find(|trigger| trigger.event_name() == name)
	}

	/// Whether the trigger should lead to a (debounced) refresh.
	#[must_use]
	pub fn schedules_update(self) -> bool {
		!matches!(self, Self::FragmentsRefreshed)
	}
}

/// Name of the event published after each successfully applied refresh.
pub const UPDATED_EVENT: &str = "woo_cart_counter_updated";

/// Publish/subscribe access to the page.
pub trait PageEvents {
	/// Subscribes `handler` to the named notification.
	///
	/// # Errors
	///
	/// Iff the listener could not be attached.
	fn subscribe(&self, event_name: &str, handler: Rc<dyn Fn()>) -> SyncResult<Subscription>;

	/// Calls `handler` whenever the page becomes visible after having been hidden.
	///
	/// # Errors
	///
	/// Iff the listener could not be attached.
	fn subscribe_visible(&self, handler: Rc<dyn Fn()>) -> SyncResult<Subscription>;

	/// Calls `handler(key, new_value)` whenever another tab changes shared storage.
	///
	/// # Errors
	///
	/// Iff the listener could not be attached.
	fn subscribe_storage(&self, handler: Rc<dyn Fn(&str, Option<&str>)>) -> SyncResult<Subscription>;

	fn publish(&self, event_name: &str, snapshot: &CartSnapshot);
}

/// Reports counter instances that were added to the page after startup.
pub trait StructureWatcher {
	type Instance;

	/// # Errors
	///
	/// Iff observation could not be started.
	fn watch(&self, on_inserted: Rc<dyn Fn(Self::Instance)>) -> SyncResult<Subscription>;
}

/// Keeps a listener attached until dropped or [cancelled](`Subscription::cancel`).
#[must_use = "Dropping a `Subscription` detaches its listener."]
pub struct Subscription(Option<Box<dyn FnOnce()>>);

impl Subscription {
	pub fn new(teardown: impl FnOnce() + 'static) -> Self {
		Self(Some(Box::new(teardown)))
	}

	pub fn cancel(mut self) {
		self.teardown();
	}

	fn teardown(&mut self) {
		if let Some(teardown) = self.0.take() {
			teardown();
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.teardown();
	}
}

impl Debug for Subscription {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Subscription").field(&self.0.is_some()).finish()
	}
}
