//! In-memory hosts: a virtual clock, storage, a page event bus and counter markup.
//!
//! These drive the controller without a browser, for headless use and tests.

use crate::{
	error::{SyncError, SyncResult},
	host::{Clock, PageEvents, StructureWatcher, Subscription, TimerHandle, Timers},
	renderer::CounterSurface,
	snapshot::CartSnapshot,
};
use hashbrown::HashMap;
use std::{
	cell::{Cell, Ref, RefCell},
	collections::{BTreeMap, BTreeSet},
	rc::{Rc, Weak},
};

/// Virtual time. Timeouts only run during [`advance`](`ManualTimers::advance`).
pub struct ManualTimers {
	now: Cell<u64>,
	next_id: Cell<i32>,
	pending: RefCell<BTreeMap<(u64, i32), Box<dyn FnOnce()>>>,
}

impl Default for ManualTimers {
	fn default() -> Self {
		Self::new()
	}
}

impl ManualTimers {
	#[must_use]
	pub fn new() -> Self {
		Self::starting_at(0)
	}

	#[must_use]
	pub fn starting_at(now_ms: u64) -> Self {
		Self {
			now: Cell::new(now_ms),
			next_id: Cell::new(1),
			pending: RefCell::default(),
		}
	}

	/// Moves the clock forward by `ms`, running every timeout that falls due on the way in order.
	pub fn advance(&self, ms: u64) {
		let target = self.now.get() + ms;
		loop {
			let due = {
				let mut pending = self.pending.borrow_mut();
				match pending.keys().next().copied() {
					Some(key) if key.0 <= target => pending.remove(&key).map(|callback| (key.0, callback)),
					_ => None,
				}
			};
			match due {
				Some((at, callback)) => {
					self.now.set(at.max(self.now.get()));
					callback();
				}
				None => break,
			}
		}
		self.now.set(target);
	}

	#[must_use]
	pub fn pending_count(&self) -> usize {
		self.pending.borrow().len()
	}
}

impl Timers for ManualTimers {
	fn set_timeout(&self, delay_ms: u32, callback: Box<dyn FnOnce()>) -> TimerHandle {
		let id = self.next_id.get();
		self.next_id.set(id.wrapping_add(1));
		self.pending.borrow_mut().insert((self.now.get() + u64::from(delay_ms), id), callback);
		TimerHandle(id)
	}

	fn clear_timeout(&self, handle: TimerHandle) {
		let mut pending = self.pending.borrow_mut();
		let key = pending.keys().find(|(_, id)| *id == handle.0).copied();
		if let Some(key) = key {
			pending.remove(&key);
		}
	}
}

impl Clock for ManualTimers {
	fn now_ms(&self) -> u64 {
		self.now.get()
	}
}

/// Shared string storage. Share one instance between controllers to simulate tabs.
#[derive(Debug)]
pub struct MemoryStorage {
	items: RefCell<HashMap<String, String>>,
	available: Cell<bool>,
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

impl MemoryStorage {
	#[must_use]
	pub fn new() -> Self {
		Self {
			items: RefCell::default(),
			available: Cell::new(true),
		}
	}

	/// While unavailable, all [`Storage`](`crate::host::Storage`) calls fail like a disabled or full browser storage.
	pub fn set_available(&self, available: bool) {
		self.available.set(available);
	}

	pub fn insert(&self, key: &str, value: &str) {
		self.items.borrow_mut().insert(key.to_owned(), value.to_owned());
	}

	#[must_use]
	pub fn get(&self, key: &str) -> Option<String> {
		self.items.borrow().get(key).cloned()
	}

	fn check(&self) -> SyncResult<()> {
		if self.available.get() {
			Ok(())
		} else {
			Err(SyncError::StorageUnavailable("memory storage disabled".to_owned()))
		}
	}
}

impl crate::host::Storage for MemoryStorage {
	fn get_item(&self, key: &str) -> SyncResult<Option<String>> {
		self.check()?;
		Ok(self.get(key))
	}

	fn set_item(&self, key: &str, value: &str) -> SyncResult<()> {
		self.check()?;
		self.insert(key, value);
		Ok(())
	}
}

type StorageHandler = Rc<dyn Fn(&str, Option<&str>)>;

#[derive(Default)]
struct Listeners {
	next_id: u64,
	named: Vec<(u64, String, Rc<dyn Fn()>)>,
	visible: Vec<(u64, Rc<dyn Fn()>)>,
	storage: Vec<(u64, StorageHandler)>,
}

impl Listeners {
	fn next_id(&mut self) -> u64 {
		self.next_id += 1;
		self.next_id
	}

	fn remove(&mut self, id: u64) {
		self.named.retain(|(other, _, _)| *other != id);
		self.visible.retain(|(other, _)| *other != id);
		self.storage.retain(|(other, _)| *other != id);
	}

	fn len(&self) -> usize {
		self.named.len() + self.visible.len() + self.storage.len()
	}
}

fn unsubscribe_on_drop(listeners: &Rc<RefCell<Listeners>>, id: u64) -> Subscription {
	let listeners: Weak<RefCell<Listeners>> = Rc::downgrade(listeners);
	Subscription::new(move || {
		if let Some(listeners) = listeners.upgrade() {
			listeners.borrow_mut().remove(id);
		}
	})
}

/// A page event bus without a page.
#[derive(Default)]
pub struct MemoryEvents {
	listeners: Rc<RefCell<Listeners>>,
	hidden: Cell<bool>,
	published: RefCell<Vec<(String, CartSnapshot)>>,
}

impl MemoryEvents {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Delivers a named notification to its subscribers.
	pub fn emit(&self, event_name: &str) {
		let handlers: Vec<_> = self
			.listeners
			.borrow()
			.named
			.iter()
			.filter(|(_, name, _)| name == event_name)
			.map(|(_, _, handler)| Rc::clone(handler))
			.collect();
		for handler in handlers {
			handler();
		}
	}

	pub fn hide(&self) {
		self.hidden.set(true);
	}

	/// Makes the page visible, notifying subscribers iff it was hidden.
	pub fn show(&self) {
		if !self.hidden.replace(false) {
			return;
		}
		let handlers: Vec<_> = self.listeners.borrow().visible.iter().map(|(_, handler)| Rc::clone(handler)).collect();
		for handler in handlers {
			handler();
		}
	}

	/// Simulates another tab writing `new_value` under `key`.
	pub fn change_storage(&self, key: &str, new_value: Option<&str>) {
		let handlers: Vec<_> = self.listeners.borrow().storage.iter().map(|(_, handler)| Rc::clone(handler)).collect();
		for handler in handlers {
			handler(key, new_value);
		}
	}

	#[must_use]
	pub fn published(&self) -> Ref<'_, Vec<(String, CartSnapshot)>> {
		self.published.borrow()
	}

	#[must_use]
	pub fn listener_count(&self) -> usize {
		self.listeners.borrow().len()
	}
}

impl PageEvents for MemoryEvents {
	fn subscribe(&self, event_name: &str, handler: Rc<dyn Fn()>) -> SyncResult<Subscription> {
		let mut listeners = self.listeners.borrow_mut();
		let id = listeners.next_id();
		listeners.named.push((id, event_name.to_owned(), handler));
		Ok(unsubscribe_on_drop(&self.listeners, id))
	}

	fn subscribe_visible(&self, handler: Rc<dyn Fn()>) -> SyncResult<Subscription> {
		let mut listeners = self.listeners.borrow_mut();
		let id = listeners.next_id();
		listeners.visible.push((id, handler));
		Ok(unsubscribe_on_drop(&self.listeners, id))
	}

	fn subscribe_storage(&self, handler: Rc<dyn Fn(&str, Option<&str>)>) -> SyncResult<Subscription> {
		let mut listeners = self.listeners.borrow_mut();
		let id = listeners.next_id();
		listeners.storage.push((id, handler));
		Ok(unsubscribe_on_drop(&self.listeners, id))
	}

	fn publish(&self, event_name: &str, snapshot: &CartSnapshot) {
		self.published.borrow_mut().push((event_name.to_owned(), snapshot.clone()));
	}
}

/// Rendered state of one in-memory counter instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CounterMarkup {
	pub count_text: String,
	pub data_count: Option<String>,
	/// [`None`] if the counter has no total element.
	pub total_markup: Option<String>,
	pub classes: BTreeSet<String>,
}

/// Handle to an in-memory counter instance.
#[derive(Debug, Clone)]
pub struct MemoryCounter(Rc<RefCell<CounterMarkup>>);

impl MemoryCounter {
	/// A counter as the server template would render it.
	#[must_use]
	pub fn rendered(count: u32, total: Option<&str>) -> Self {
		Self(Rc::new(RefCell::new(CounterMarkup {
			count_text: count.to_string(),
			data_count: Some(count.to_string()),
			total_markup: total.map(ToOwned::to_owned),
			classes: BTreeSet::new(),
		})))
	}

	#[must_use]
	pub fn markup(&self) -> CounterMarkup {
		self.0.borrow().clone()
	}

	#[must_use]
	pub fn count_text(&self) -> String {
		self.0.borrow().count_text.clone()
	}

	#[must_use]
	pub fn total_markup(&self) -> Option<String> {
		self.0.borrow().total_markup.clone()
	}

	#[must_use]
	pub fn has_class(&self, class: &str) -> bool {
		self.0.borrow().classes.contains(class)
	}
}

type InsertionHandler<I> = Rc<dyn Fn(I)>;

/// Counter instances without a DOM. Also reports [inserted](`MemorySurface::insert`) instances.
#[derive(Default)]
pub struct MemorySurface {
	counters: RefCell<Vec<MemoryCounter>>,
	fragments: RefCell<Vec<(String, String)>>,
	watchers: Rc<RefCell<Vec<(u64, InsertionHandler<MemoryCounter>)>>>,
	next_watcher: Cell<u64>,
}

impl MemorySurface {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds a counter that was present at page load.
	pub fn add(&self, counter: MemoryCounter) -> MemoryCounter {
		self.counters.borrow_mut().push(counter.clone());
		counter
	}

	/// Adds a counter after page load and notifies watchers.
	pub fn insert(&self, counter: MemoryCounter) -> MemoryCounter {
		self.add(counter.clone());
		let watchers: Vec<_> = self.watchers.borrow().iter().map(|(_, handler)| Rc::clone(handler)).collect();
		for watcher in watchers {
			watcher(counter.clone());
		}
		counter
	}

	/// Fragment replacements in application order.
	#[must_use]
	pub fn replaced_fragments(&self) -> Vec<(String, String)> {
		self.fragments.borrow().clone()
	}
}

impl CounterSurface for MemorySurface {
	type Instance = MemoryCounter;

	fn instances(&self) -> Vec<MemoryCounter> {
		self.counters.borrow().clone()
	}

	fn set_count(&self, instance: &MemoryCounter, count: u32) {
		let mut markup = instance.0.borrow_mut();
		markup.count_text = count.to_string();
		markup.data_count = Some(count.to_string());
	}

	fn set_total_markup(&self, instance: &MemoryCounter, total: &str) {
		if let Some(markup) = &mut instance.0.borrow_mut().total_markup {
			*markup = total.to_owned();
		}
	}

	fn set_class(&self, instance: &MemoryCounter, class: &str, enabled: bool) {
		let mut markup = instance.0.borrow_mut();
		if enabled {
			markup.classes.insert(class.to_owned());
		} else {
			markup.classes.remove(class);
		}
	}

	fn replace_fragment(&self, selector: &str, markup: &str) {
		self.fragments.borrow_mut().push((selector.to_owned(), markup.to_owned()));
	}

	fn initial_count(&self) -> Option<u32> {
		let counters = self.counters.borrow();
		let markup = counters.first()?.0.borrow();
		markup
			.data_count
			.as_deref()
			.filter(|count| !count.trim().is_empty())
			.unwrap_or(&markup.count_text)
			.trim()
			.parse()
			.ok()
	}
}

impl StructureWatcher for MemorySurface {
	type Instance = MemoryCounter;

	fn watch(&self, on_inserted: Rc<dyn Fn(MemoryCounter)>) -> SyncResult<Subscription> {
		let id = self.next_watcher.get() + 1;
		self.next_watcher.set(id);
		self.watchers.borrow_mut().push((id, on_inserted));

		let watchers = Rc::downgrade(&self.watchers);
		Ok(Subscription::new(move || {
			if let Some(watchers) = watchers.upgrade() {
				watchers.borrow_mut().retain(|(other, _)| *other != id);
			}
		}))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn timeouts_run_in_due_order() {
		let timers = ManualTimers::new();
		let log = Rc::new(RefCell::new(Vec::new()));
		for (delay, name) in &[(30, "c"), (10, "a"), (20, "b")] {
			let log = Rc::clone(&log);
			let name = *name;
			timers.set_timeout(*delay, Box::new(move || log.borrow_mut().push(name)));
		}

		timers.advance(15);
		assert_eq!(*log.borrow(), ["a"]);
		assert_eq!(timers.now_ms(), 15);

		timers.advance(100);
		assert_eq!(*log.borrow(), ["a", "b", "c"]);
		assert_eq!(timers.pending_count(), 0);
	}

	#[test]
	fn cleared_timeouts_never_run() {
		let timers = ManualTimers::new();
		let ran = Rc::new(Cell::new(false));
		let handle = timers.set_timeout(10, {
			let ran = Rc::clone(&ran);
			Box::new(move || ran.set(true))
		});
		timers.clear_timeout(handle);
		timers.clear_timeout(handle);
		timers.advance(20);
		assert!(!ran.get());
	}

	#[test]
	fn timeouts_scheduled_from_callbacks() {
		let timers = Rc::new(ManualTimers::new());
		let ran_at = Rc::new(Cell::new(0));
		timers.set_timeout(10, {
			let timers2 = Rc::clone(&timers);
			let ran_at = Rc::clone(&ran_at);
			Box::new(move || {
				let timers3 = Rc::clone(&timers2);
				timers2.set_timeout(5, Box::new(move || ran_at.set(timers3.now_ms())));
			})
		});
		timers.advance(100);
		assert_eq!(ran_at.get(), 15);
	}

	#[test]
	fn dropped_subscriptions_stop_delivery() {
		let events = MemoryEvents::new();
		let count = Rc::new(Cell::new(0));
		let subscription = events
			.subscribe("added_to_cart", {
				let count = Rc::clone(&count);
				Rc::new(move || count.set(count.get() + 1))
			})
			.unwrap();
		events.emit("added_to_cart");
		events.emit("removed_from_cart");
		drop(subscription);
		events.emit("added_to_cart");
		assert_eq!(count.get(), 1);
		assert_eq!(events.listener_count(), 0);
	}

	#[test]
	fn initial_count_prefers_data_attribute() {
		let surface = MemorySurface::new();
		assert_eq!(surface.initial_count(), None);
		let counter = surface.add(MemoryCounter::rendered(2, None));
		counter.0.borrow_mut().count_text = "two".to_owned();
		assert_eq!(surface.initial_count(), Some(2));
	}

	#[test]
	fn blank_data_attribute_falls_back_to_text() {
		let surface = MemorySurface::new();
		let counter = surface.add(MemoryCounter::rendered(4, None));
		counter.0.borrow_mut().data_count = Some(" ".to_owned());
		assert_eq!(surface.initial_count(), Some(4));
		counter.0.borrow_mut().data_count = None;
		assert_eq!(surface.initial_count(), Some(4));
	}
}
