use crate::{
	config::StateClasses,
	host::Timers,
	snapshot::{CartSnapshot, CountChange},
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{instrument, trace};

/// How long the increase/decrease class stays on counter roots.
pub const ANIMATION_MS: u32 = 600;

/// Markup-level access to counter instances.
///
/// Implementations locate instances (for example by CSS selector) but never interpret snapshots.
pub trait CounterSurface {
	type Instance: Clone + 'static;

	/// All counter instances currently on the page.
	fn instances(&self) -> Vec<Self::Instance>;

	/// Sets text and `data-count` of every count element within `instance`.
	fn set_count(&self, instance: &Self::Instance, count: u32);

	/// Replaces the markup of every total element within `instance`.
	fn set_total_markup(&self, instance: &Self::Instance, markup: &str);

	fn set_class(&self, instance: &Self::Instance, class: &str, enabled: bool);

	/// Replaces each element matching `selector` with the first node parsed from `markup`.
	fn replace_fragment(&self, selector: &str, markup: &str);

	/// The count rendered into the page before any update, if there is one.
	fn initial_count(&self) -> Option<u32>;
}

/// Applies snapshots to every counter instance of a [`CounterSurface`].
pub struct CounterRenderer<I> {
	surface: Rc<dyn CounterSurface<Instance = I>>,
	timers: Rc<dyn Timers>,
	classes: StateClasses,
}

impl<I: Clone + 'static> CounterRenderer<I> {
	#[must_use]
	pub fn new(surface: Rc<dyn CounterSurface<Instance = I>>, timers: Rc<dyn Timers>, classes: StateClasses) -> Self {
		Self { surface, timers, classes }
	}

	#[must_use]
	pub fn initial_count(&self) -> Option<u32> {
		self.surface.initial_count()
	}

	/// Updates all instances. If `previous` is known and differs, plays the directional animation.
	#[instrument(skip(self, snapshot), fields(count = snapshot.count))]
	pub fn apply(&self, snapshot: &CartSnapshot, previous: Option<u32>) {
		let instances = self.surface.instances();
		trace!(instances = instances.len(), "Applying snapshot.");
		for instance in &instances {
			self.render(instance, snapshot);
		}

		if let Some(change) = CountChange::between(previous, snapshot.count) {
			self.animate(instances, change);
		}
	}

	/// Updates a single, newly discovered instance. Never animates.
	pub fn apply_to_instance(&self, instance: &I, snapshot: &CartSnapshot) {
		self.render(instance, snapshot);
	}

	pub fn apply_fragments(&self, fragments: &HashMap<String, String>) {
		for (selector, markup) in fragments {
			if cfg!(feature = "dangerous-logging") {
				trace!(selector = selector.as_str(), markup = markup.as_str(), "Replacing fragment.");
			} else {
				trace!(selector = selector.as_str(), "Replacing fragment.");
			}
			self.surface.replace_fragment(selector, markup);
		}
	}

	fn render(&self, instance: &I, snapshot: &CartSnapshot) {
		self.surface.set_count(instance, snapshot.count);
		// An empty total is no total.
		if let Some(total) = snapshot.total.as_deref().filter(|total| !total.is_empty()) {
			self.surface.set_total_markup(instance, total);
		}
		self.surface.set_class(instance, &self.classes.empty, snapshot.is_empty());
	}

	fn animate(&self, instances: Vec<I>, change: CountChange) {
		let class = match change {
			CountChange::Increase => self.classes.increase.clone(),
			CountChange::Decrease => self.classes.decrease.clone(),
		};
		trace!(?change, "Animating count change.");
		for instance in &instances {
			self.surface.set_class(instance, &class, true);
		}

		let surface = Rc::clone(&self.surface);
		self.timers.set_timeout(
			ANIMATION_MS,
			Box::new(move || {
				for instance in &instances {
					surface.set_class(instance, &class, false);
				}
			}),
		);
	}
}
