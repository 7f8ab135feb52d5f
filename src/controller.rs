use crate::{
	cache::LocalCache,
	config::SyncConfig,
	error::SyncError,
	host::{Clock, PageEvents, Storage, StructureWatcher, Subscription, TimerHandle, Timers, Trigger, UPDATED_EVENT},
	provider::{CartProvider, FetchRequest},
	renderer::{CounterRenderer, CounterSurface},
	snapshot::CartSnapshot,
};
use std::{
	cell::{Cell, RefCell},
	rc::{Rc, Weak},
};
use tracing::{debug, error, instrument, trace, warn};

/// The controller's collaborators.
pub struct Host<I> {
	pub provider: Rc<dyn CartProvider>,
	pub timers: Rc<dyn Timers>,
	pub clock: Rc<dyn Clock>,
	pub storage: Rc<dyn Storage>,
	pub events: Rc<dyn PageEvents>,
	pub surface: Rc<dyn CounterSurface<Instance = I>>,
	pub watcher: Option<Rc<dyn StructureWatcher<Instance = I>>>,
	/// Observes failures. The counters themselves never show an error state.
	pub on_error: Option<Rc<dyn Fn(&SyncError)>>,
}

impl<I> Host<I> {
	pub fn new(
		provider: Rc<dyn CartProvider>,
		timers: Rc<dyn Timers>,
		clock: Rc<dyn Clock>,
		storage: Rc<dyn Storage>,
		events: Rc<dyn PageEvents>,
		surface: Rc<dyn CounterSurface<Instance = I>>,
	) -> Self {
		Self {
			provider,
			timers,
			clock,
			storage,
			events,
			surface,
			watcher: None,
			on_error: None,
		}
	}

	#[must_use]
	pub fn with_watcher(mut self, watcher: Rc<dyn StructureWatcher<Instance = I>>) -> Self {
		self.watcher = Some(watcher);
		self
	}

	#[must_use]
	pub fn with_error_hook(mut self, on_error: impl Fn(&SyncError) + 'static) -> Self {
		self.on_error = Some(Rc::new(on_error));
		self
	}
}

/// Mutable per-controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncState {
	pub last_count: Option<u32>,
	pub is_fetch_in_flight: bool,
	pub pending_timer: Option<TimerHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
	Idle,
	Debouncing,
	Fetching,
}

impl SyncState {
	/// A pending debounce during a fetch reports [`SyncPhase::Fetching`].
	#[must_use]
	pub fn phase(&self) -> SyncPhase {
		if self.is_fetch_in_flight {
			SyncPhase::Fetching
		} else if self.pending_timer.is_some() {
			SyncPhase::Debouncing
		} else {
			SyncPhase::Idle
		}
	}
}

/// Keeps every counter instance on the page consistent with the cart, with as few fetches as possible.
///
/// Refreshes are debounced (trailing edge) and at most one fetch is in flight at any time.
/// Cross-tab storage notifications and newly inserted counters are served from the [`LocalCache`] without fetching.
///
/// Nothing here returns errors: failures are logged, reported to [`Host::on_error`] and leave the displayed state as it is.
pub struct CartSyncController<I: Clone + 'static> {
	inner: Rc<Inner<I>>,
}

struct Inner<I: Clone + 'static> {
	config: SyncConfig,
	/// [`None`] iff the configuration is invalid, which disables fetching.
	request: Option<FetchRequest>,
	provider: Rc<dyn CartProvider>,
	timers: Rc<dyn Timers>,
	events: Rc<dyn PageEvents>,
	cache: LocalCache,
	renderer: CounterRenderer<I>,
	on_error: Option<Rc<dyn Fn(&SyncError)>>,
	state: RefCell<SyncState>,
	active: Cell<bool>,
	subscriptions: RefCell<Vec<Subscription>>,
}

impl<I: Clone + 'static> CartSyncController<I> {
	/// Applies a fresh cached snapshot right away, then subscribes to all update triggers.
	#[must_use]
	#[instrument(skip(config, host), fields(ajax_enabled = config.ajax_enabled, update_delay_ms = config.update_delay_ms))]
	pub fn initialize(config: SyncConfig, host: Host<I>) -> Self {
		let config = config.normalized();
		let request = match config.validate() {
			Ok(()) => Some(FetchRequest {
				endpoint: config.fetch_endpoint.clone().unwrap_or_default(),
				auth_token: config.auth_token.clone().unwrap_or_default(),
			}),
			Err(error) => {
				error!(%error, "Cart refreshes are disabled.");
				if let Some(on_error) = &host.on_error {
					on_error(&error);
				}
				None
			}
		};

		let cache = LocalCache::new(host.storage, host.clock, config.storage_key.clone());
		let renderer = CounterRenderer::new(host.surface, Rc::clone(&host.timers), config.classes.clone());
		let last_count = renderer.initial_count();
		trace!(?last_count, "Read pre-rendered count.");

		let inner = Rc::new(Inner {
			config,
			request,
			provider: host.provider,
			timers: host.timers,
			events: Rc::clone(&host.events),
			cache,
			renderer,
			on_error: host.on_error,
			state: RefCell::new(SyncState { last_count, ..SyncState::default() }),
			active: Cell::new(true),
			subscriptions: RefCell::default(),
		});

		if let Some(snapshot) = inner.cache.read() {
			debug!(count = snapshot.count, "Applying cached snapshot.");
			inner.render(&snapshot);
		}

		inner.subscribe_all(&*host.events, host.watcher.as_deref());
		Self { inner }
	}

	/// Requests a refresh after the configured quiet period. Calls within the period restart it.
	pub fn schedule_update(&self) {
		self.inner.schedule_update();
	}

	/// Fetches right away, unless a fetch is already in flight.
	pub fn fetch_and_apply(&self) {
		self.inner.fetch_and_apply();
	}

	/// Applies a snapshot as if it had just been fetched.
	pub fn handle_snapshot(&self, snapshot: &CartSnapshot) {
		self.inner.handle_snapshot(snapshot);
	}

	#[must_use]
	pub fn state(&self) -> SyncState {
		*self.inner.state.borrow()
	}

	#[must_use]
	pub fn config(&self) -> &SyncConfig {
		&self.inner.config
	}

	/// Whether [`schedule_update`](`CartSyncController::schedule_update`) can lead to a fetch.
	#[must_use]
	pub fn is_fetch_enabled(&self) -> bool {
		self.inner.fetch_enabled()
	}

	/// Cancels the pending refresh and detaches all listeners. A fetch already in flight completes into nothing.
	#[instrument(skip(self))]
	pub fn teardown(&self) {
		self.inner.active.set(false);
		self.inner.cancel_pending();
		let subscriptions = self.inner.subscriptions.replace(Vec::new());
		debug!(count = subscriptions.len(), "Detaching listeners.");
		drop(subscriptions);
	}
}

impl<I: Clone + 'static> Inner<I> {
	fn fetch_enabled(&self) -> bool {
		self.active.get() && self.config.ajax_enabled && self.request.is_some()
	}

	fn subscribe_all(self: &Rc<Self>, events: &dyn PageEvents, watcher: Option<&dyn StructureWatcher<Instance = I>>) {
		let mut subscriptions = Vec::new();

		for trigger in Trigger::ALL.iter().copied() {
			let this = Rc::downgrade(self);
			let handler: Rc<dyn Fn()> = Rc::new(move || {
				trace!(event = trigger.event_name(), "Trigger received.");
				if !trigger.schedules_update() {
					// The storefront has already replaced its fragments.
					return;
				}
				if let Some(this) = this.upgrade() {
					this.schedule_update();
				}
			});
			push_subscription(&mut subscriptions, trigger.event_name(), events.subscribe(trigger.event_name(), handler));
		}

		let this = Rc::downgrade(self);
		push_subscription(
			&mut subscriptions,
			"visibility",
			events.subscribe_visible(Rc::new(move || {
				if let Some(this) = this.upgrade() {
					trace!("Page became visible.");
					this.schedule_update();
				}
			})),
		);

		let this = Rc::downgrade(self);
		push_subscription(
			&mut subscriptions,
			"storage",
			events.subscribe_storage(Rc::new(move |key: &str, new_value: Option<&str>| {
				if let Some(this) = this.upgrade() {
					this.on_storage_change(key, new_value);
				}
			})),
		);

		if let Some(watcher) = watcher {
			let this: Weak<Self> = Rc::downgrade(self);
			push_subscription(
				&mut subscriptions,
				"insertions",
				watcher.watch(Rc::new(move |instance| {
					if let Some(this) = this.upgrade() {
						this.on_inserted(&instance);
					}
				})),
			);
		}

		self.subscriptions.borrow_mut().extend(subscriptions);
	}

	#[instrument(skip(self))]
	fn schedule_update(self: &Rc<Self>) {
		if !self.fetch_enabled() {
			return trace!("Refreshes disabled; ignoring update request.");
		}

		self.cancel_pending();
		let this = Rc::downgrade(self);
		let handle = self.timers.set_timeout(
			self.config.update_delay_ms,
			Box::new(move || {
				if let Some(this) = this.upgrade() {
					this.state.borrow_mut().pending_timer = None;
					this.fetch_and_apply();
				}
			}),
		);
		self.state.borrow_mut().pending_timer = Some(handle);
	}

	fn cancel_pending(&self) {
		let pending = self.state.borrow_mut().pending_timer.take();
		if let Some(handle) = pending {
			trace!(?handle, "Restarting debounce.");
			self.timers.clear_timeout(handle);
		}
	}

	#[instrument(skip(self))]
	fn fetch_and_apply(self: &Rc<Self>) {
		let request = match &self.request {
			Some(request) if self.active.get() => request,
			_ => return trace!("Refreshes disabled; not fetching."),
		};

		{
			let mut state = self.state.borrow_mut();
			if state.is_fetch_in_flight {
				return debug!("Fetch already in flight; dropping this one.");
			}
			state.is_fetch_in_flight = true;
		}

		let this = Rc::downgrade(self);
		self.provider.fetch_snapshot(
			request,
			Box::new(move |result| {
				let this = match this.upgrade() {
					Some(this) => this,
					None => return trace!("Controller dropped before the fetch completed."),
				};
				this.state.borrow_mut().is_fetch_in_flight = false;
				if !this.active.get() {
					return trace!("Controller torn down before the fetch completed.");
				}
				match result {
					Ok(snapshot) => this.handle_snapshot(&snapshot),
					Err(error) => this.report(&error),
				}
			}),
		);
	}

	#[instrument(skip(self, snapshot), fields(count = snapshot.count))]
	fn handle_snapshot(&self, snapshot: &CartSnapshot) {
		if cfg!(feature = "dangerous-logging") {
			debug!(total = ?snapshot.total, fragments = snapshot.fragments.len(), "Applying snapshot.");
		}
		self.render(snapshot);
		self.cache.store(snapshot);
		self.events.publish(UPDATED_EVENT, snapshot);
		if !snapshot.fragments.is_empty() {
			self.renderer.apply_fragments(&snapshot.fragments);
		}
	}

	/// Last applied wins, whichever path it came from.
	fn render(&self, snapshot: &CartSnapshot) {
		let previous = self.state.borrow_mut().last_count.replace(snapshot.count);
		self.renderer.apply(snapshot, previous);
	}

	fn on_storage_change(&self, key: &str, new_value: Option<&str>) {
		if key != self.cache.key() {
			return;
		}
		match LocalCache::on_external_change(new_value) {
			Some(snapshot) => {
				debug!(count = snapshot.count, "Applying snapshot from another tab.");
				self.render(&snapshot);
			}
			None => trace!("Ignoring cleared or unparsable cross-tab entry."),
		}
	}

	fn on_inserted(&self, instance: &I) {
		match self.cache.read() {
			Some(snapshot) => {
				trace!(count = snapshot.count, "Populating inserted counter from cache.");
				self.renderer.apply_to_instance(instance, &snapshot);
			}
			None => trace!("No fresh cached snapshot for inserted counter."),
		}
	}

	fn report(&self, error: &SyncError) {
		warn!(%error, "Cart refresh failed; keeping the displayed state.");
		if let Some(on_error) = &self.on_error {
			on_error(error);
		}
	}
}

impl<I: Clone + 'static> Drop for Inner<I> {
	fn drop(&mut self) {
		if let Some(handle) = self.state.get_mut().pending_timer.take() {
			self.timers.clear_timeout(handle);
		}
	}
}

fn push_subscription(subscriptions: &mut Vec<Subscription>, what: &str, subscription: Result<Subscription, SyncError>) {
	match subscription {
		Ok(subscription) => subscriptions.push(subscription),
		Err(error) => warn!(%error, what, "Could not subscribe."),
	}
}
