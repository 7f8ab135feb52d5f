use crate::{
	config::Selectors,
	error::{describe_js, SyncError, SyncResult},
	host::{StructureWatcher, Subscription},
	renderer::CounterSurface,
};
use std::rc::Rc;
use tracing::{error, instrument, trace, warn};
use wasm_bindgen::{closure::Closure, JsCast, JsValue};
use web_sys::{Document, Element, MutationObserver, MutationObserverInit, MutationRecord, Node, NodeList};

/// Counter instances are the [***Element***](https://developer.mozilla.org/en-US/docs/Web/API/element)s matching [`Selectors::counter`].
#[derive(Debug, Clone)]
pub struct DomSurface {
	document: Document,
	selectors: Selectors,
}

impl DomSurface {
	#[must_use]
	pub fn new(document: Document, selectors: Selectors) -> Self {
		Self { document, selectors }
	}
}

/// Collects the [***Element***](https://developer.mozilla.org/en-US/docs/Web/API/element)s of a `querySelectorAll` result.
///
/// Invalid selectors throw in the browser; they match nothing here.
pub(crate) fn elements(query: Result<NodeList, JsValue>, selector: &str) -> Vec<Element> {
	let list = match query {
		Ok(list) => list,
		Err(error) => {
			warn!(selector, error = %describe_js(&error), "Invalid selector.");
			return Vec::new();
		}
	};
	(0..list.length())
		.filter_map(|i| list.item(i))
		.filter_map(|node| node.dyn_into::<Element>().ok())
		.collect()
}

/// Parses `markup` in a detached container and returns its first node, like a fragment refresh does.
pub fn load_first_node(document: &Document, markup: &str) -> SyncResult<Option<Node>> {
	let container = document.create_element("div").map_err(|error| SyncError::MalformedResponse(describe_js(&error)))?;
	container.set_inner_html(markup);
	Ok(container.first_child())
}

impl CounterSurface for DomSurface {
	type Instance = Element;

	fn instances(&self) -> Vec<Element> {
		elements(self.document.query_selector_all(&self.selectors.counter), &self.selectors.counter)
	}

	fn set_count(&self, instance: &Element, count: u32) {
		let text = count.to_string();
		for element in elements(instance.query_selector_all(&self.selectors.count), &self.selectors.count) {
			element.set_text_content(Some(&text));
			if let Err(error) = element.set_attribute("data-count", &text) {
				warn!(error = %describe_js(&error), "Could not set `data-count`.");
			}
		}
	}

	fn set_total_markup(&self, instance: &Element, markup: &str) {
		for element in elements(instance.query_selector_all(&self.selectors.total), &self.selectors.total) {
			element.set_inner_html(markup);
		}
	}

	fn set_class(&self, instance: &Element, class: &str, enabled: bool) {
		let class_list = instance.class_list();
		let result = if enabled { class_list.add_1(class) } else { class_list.remove_1(class) };
		if let Err(error) = result {
			warn!(class, error = %describe_js(&error), "Could not toggle class.");
		}
	}

	#[instrument(skip(self, markup))]
	fn replace_fragment(&self, selector: &str, markup: &str) {
		for element in elements(self.document.query_selector_all(selector), selector) {
			let replacement = match load_first_node(&self.document, markup) {
				Ok(Some(node)) => node,
				Ok(None) => {
					trace!("Empty fragment; leaving the element in place.");
					continue;
				}
				Err(error) => return error!(%error, "Could not parse fragment."),
			};
			let parent = match element.parent_node() {
				Some(parent) => parent,
				None => continue,
			};
			if let Err(error) = parent.replace_child(&replacement, &element) {
				warn!(error = %describe_js(&error), "Could not replace fragment.");
			}
		}
	}

	fn initial_count(&self) -> Option<u32> {
		let element = self.document.query_selector(&self.selectors.count).ok()??;
		element
			.get_attribute("data-count")
			.filter(|count| !count.trim().is_empty())
			.or_else(|| element.text_content())?
			.trim()
			.parse()
			.ok()
	}
}

/// Reports counters added to `document.body` (directly or within inserted subtrees) through a [***MutationObserver***](https://developer.mozilla.org/en-US/docs/Web/API/MutationObserver).
#[derive(Debug, Clone)]
pub struct DomWatcher {
	document: Document,
	counter_selector: String,
}

impl DomWatcher {
	#[must_use]
	pub fn new(document: Document, counter_selector: impl Into<String>) -> Self {
		Self {
			document,
			counter_selector: counter_selector.into(),
		}
	}
}

impl StructureWatcher for DomWatcher {
	type Instance = Element;

	fn watch(&self, on_inserted: Rc<dyn Fn(Element)>) -> SyncResult<Subscription> {
		let body = self.document.body().ok_or_else(|| SyncError::Configuration("no `document.body` to observe".to_owned()))?;
		let selector = self.counter_selector.clone();

		let callback = Closure::wrap(Box::new(move |records: js_sys::Array, _observer: MutationObserver| {
			for record in records.iter() {
				let record = match record.dyn_into::<MutationRecord>() {
					Ok(record) => record,
					Err(_) => continue,
				};
				let added = record.added_nodes();
				for node in (0..added.length()).filter_map(|i| added.item(i)) {
					let element = match node.dyn_into::<Element>() {
						Ok(element) => element,
						Err(_) => continue,
					};
					if element.matches(&selector).unwrap_or(false) {
						on_inserted(element.clone());
					}
					for nested in elements(element.query_selector_all(&selector), &selector) {
						on_inserted(nested);
					}
				}
			}
		}) as Box<dyn Fn(js_sys::Array, MutationObserver)>);

		let observer = MutationObserver::new(callback.as_ref().unchecked_ref()).map_err(|error| SyncError::Configuration(describe_js(&error)))?;
		let mut options = MutationObserverInit::new();
		options.child_list(true).subtree(true);
		observer
			.observe_with_options(&body, &options)
			.map_err(|error| SyncError::Configuration(describe_js(&error)))?;
		trace!("Observing insertions.");

		Ok(Subscription::new(move || {
			observer.disconnect();
			drop(callback);
			trace!("Stopped observing insertions.");
		}))
	}
}
