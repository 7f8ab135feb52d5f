use cart_counter_dom::{
	cache::CACHE_TTL_MS,
	memory::MemoryCounter,
	CartSnapshot, SyncError, SyncPhase,
};

use sync_rig_::{config, snapshot, Rig};

const INCREASE: &str = "woo-cart-counter-increase";
const DECREASE: &str = "woo-cart-counter-decrease";
const EMPTY: &str = "woo-cart-counter-empty";

#[test]
fn item_added_updates_count_total_and_animates() {
	let rig = Rig::new();
	let header = rig.surface.add(MemoryCounter::rendered(2, Some("$20.00")));
	let widget = rig.surface.add(MemoryCounter::rendered(2, None));
	let controller = rig.start(config());
	assert_eq!(controller.state().last_count, Some(2));

	rig.events.emit("added_to_cart");
	rig.timers.advance(1000);
	assert_eq!(rig.provider.calls(), 1);
	rig.provider.resolve(Ok(snapshot(3, "$29.99")));

	for counter in &[&header, &widget] {
		assert_eq!(counter.count_text(), "3");
		assert_eq!(counter.markup().data_count.as_deref(), Some("3"));
		assert!(counter.has_class(INCREASE));
		assert!(!counter.has_class(EMPTY));
	}
	assert_eq!(header.total_markup().as_deref(), Some("$29.99"));
	assert_eq!(widget.total_markup(), None);

	rig.timers.advance(599);
	assert!(header.has_class(INCREASE));
	rig.timers.advance(1);
	assert!(!header.has_class(INCREASE));
	assert!(!widget.has_class(INCREASE));
	assert_eq!(controller.state().last_count, Some(3));
}

#[test]
fn emptied_cart_decreases_and_marks_empty() {
	let rig = Rig::new();
	let counter = rig.surface.add(MemoryCounter::rendered(1, Some("$5.00")));
	let controller = rig.start(config());

	controller.fetch_and_apply();
	rig.provider.resolve(Ok(snapshot(0, "$0.00")));
	assert_eq!(counter.count_text(), "0");
	assert!(counter.has_class(EMPTY));
	assert!(counter.has_class(DECREASE));
	assert!(!counter.has_class(INCREASE));
}

#[test]
fn failed_fetch_keeps_state_and_later_triggers_work() {
	let rig = Rig::new();
	let counter = rig.surface.add(MemoryCounter::rendered(2, Some("$20.00")));
	let controller = rig.start(config());
	let before = counter.markup();

	rig.events.emit("added_to_cart");
	rig.timers.advance(1000);
	rig.provider.resolve(Err(SyncError::Transport("offline".to_owned())));

	assert_eq!(counter.markup(), before);
	assert_eq!(controller.state().phase(), SyncPhase::Idle);
	assert_eq!(rig.errors.borrow().as_slice(), [SyncError::Transport("offline".to_owned())]);
	assert!(rig.events.published().is_empty());
	assert_eq!(rig.storage.get("woo_cart_counter_data"), None);

	rig.events.emit("added_to_cart");
	rig.timers.advance(1000);
	assert_eq!(rig.provider.calls(), 2);
	rig.provider.resolve(Ok(snapshot(5, "$50.00")));
	assert_eq!(counter.count_text(), "5");
}

#[test]
fn malformed_response_is_a_failure_too() {
	let rig = Rig::new();
	let counter = rig.surface.add(MemoryCounter::rendered(2, None));
	let controller = rig.start(config());

	controller.fetch_and_apply();
	rig.provider.resolve(Err(SyncError::MalformedResponse("expected value".to_owned())));
	assert_eq!(counter.count_text(), "2");
	assert!(!counter.has_class(INCREASE) && !counter.has_class(DECREASE));
	assert_eq!(rig.timers.pending_count(), 0);
}

#[test]
fn inserted_counter_is_populated_from_cache() {
	let rig = Rig::new();
	let _controller = rig.start(config());
	rig.cache(4, "$40.00", 1000);

	let inserted = rig.surface.insert(MemoryCounter::rendered(0, Some("$0.00")));
	assert_eq!(inserted.count_text(), "4");
	assert_eq!(inserted.total_markup().as_deref(), Some("$40.00"));
	assert!(!inserted.has_class(EMPTY));
	assert!(!inserted.has_class(INCREASE));
	assert_eq!(rig.provider.calls(), 0);
	assert_eq!(rig.timers.pending_count(), 0);
}

#[test]
fn inserted_counter_keeps_prerendered_values_without_fresh_cache() {
	let rig = Rig::new();
	let _controller = rig.start(config());
	rig.cache(4, "$40.00", CACHE_TTL_MS);

	let inserted = rig.surface.insert(MemoryCounter::rendered(1, Some("$9.00")));
	assert_eq!(inserted.count_text(), "1");
	assert_eq!(inserted.total_markup().as_deref(), Some("$9.00"));
}

#[test]
fn warm_cache_applies_at_startup() {
	let rig = Rig::new();
	let counter = rig.surface.add(MemoryCounter::rendered(2, Some("$20.00")));
	rig.cache(7, "$70.00", CACHE_TTL_MS - 1);

	let controller = rig.start(config());
	assert_eq!(counter.count_text(), "7");
	assert_eq!(counter.total_markup().as_deref(), Some("$70.00"));
	assert_eq!(controller.state().last_count, Some(7));
	assert_eq!(rig.provider.calls(), 0);
}

#[test]
fn expired_cache_is_ignored_at_startup() {
	let rig = Rig::new();
	let counter = rig.surface.add(MemoryCounter::rendered(2, Some("$20.00")));
	rig.cache(7, "$70.00", CACHE_TTL_MS);

	let controller = rig.start(config());
	assert_eq!(counter.count_text(), "2");
	assert_eq!(controller.state().last_count, Some(2));
}

#[test]
fn empty_total_keeps_the_rendered_one() {
	let rig = Rig::new();
	let counter = rig.surface.add(MemoryCounter::rendered(2, Some("$20.00")));
	let controller = rig.start(config());

	controller.handle_snapshot(&snapshot(3, ""));
	assert_eq!(counter.count_text(), "3");
	assert_eq!(counter.total_markup().as_deref(), Some("$20.00"));
}

#[test]
fn same_snapshot_twice_is_idempotent() {
	let rig = Rig::new();
	let counter = rig.surface.add(MemoryCounter::rendered(2, Some("$20.00")));
	let controller = rig.start(config());
	let update = snapshot(3, "$29.99");

	controller.handle_snapshot(&update);
	rig.timers.advance(600);
	let first = counter.markup();
	assert!(!first.classes.contains(INCREASE));

	controller.handle_snapshot(&update);
	assert_eq!(counter.markup(), first);
	assert_eq!(rig.timers.pending_count(), 0);
}

#[test]
fn other_tabs_follow_without_fetching() {
	let tab_a = Rig::new();
	let tab_b = tab_a.second_tab();
	tab_a.surface.add(MemoryCounter::rendered(1, None));
	let counter_b = tab_b.surface.add(MemoryCounter::rendered(1, Some("$10.00")));
	let controller_a = tab_a.start(config());
	let _controller_b = tab_b.start(config());

	controller_a.fetch_and_apply();
	tab_a.provider.resolve(Ok(snapshot(3, "$30.00")));

	let written = tab_a.storage.get("woo_cart_counter_data");
	assert!(written.is_some());
	tab_b.events.change_storage("some_other_key", written.as_deref());
	assert_eq!(counter_b.count_text(), "1");

	tab_b.events.change_storage("woo_cart_counter_data", written.as_deref());
	assert_eq!(counter_b.count_text(), "3");
	assert_eq!(counter_b.total_markup().as_deref(), Some("$30.00"));
	assert!(counter_b.has_class(INCREASE));
	assert_eq!(tab_b.provider.calls(), 0);
	assert!(tab_b.events.published().is_empty());

	tab_b.events.change_storage("woo_cart_counter_data", None);
	tab_b.events.change_storage("woo_cart_counter_data", Some("garbage"));
	assert_eq!(counter_b.count_text(), "3");
}

#[test]
fn successful_fetch_stores_publishes_and_replaces_fragments() {
	let rig = Rig::new();
	rig.surface.add(MemoryCounter::rendered(0, None));
	let controller = rig.start(config());
	let markup = r#"<span class="woo-cart-counter-count" data-count="2">2</span>"#;
	let update = snapshot(2, "$12.00").with_fragment(".woo-cart-counter-count", markup);

	controller.fetch_and_apply();
	rig.provider.resolve(Ok(update.clone()));

	assert_eq!(rig.events.published().as_slice(), [("woo_cart_counter_updated".to_owned(), update)]);
	assert_eq!(rig.surface.replaced_fragments(), [(".woo-cart-counter-count".to_owned(), markup.to_owned())]);

	let cached: serde_json::Value = serde_json::from_str(&rig.storage.get("woo_cart_counter_data").unwrap()).unwrap();
	assert_eq!(cached["count"], 2);
	assert_eq!(cached["total"], "$12.00");
	assert_eq!(cached["timestamp"], sync_rig_::START_MS);
	assert!(cached.get("fragments").is_none());
}

#[test]
fn unavailable_storage_does_not_block_rendering() {
	let rig = Rig::new();
	let counter = rig.surface.add(MemoryCounter::rendered(2, None));
	rig.storage.set_available(false);
	let controller = rig.start(config());

	controller.fetch_and_apply();
	rig.provider.resolve(Ok(CartSnapshot::new(4)));
	assert_eq!(counter.count_text(), "4");
	assert_eq!(rig.events.published().len(), 1);
	assert!(rig.errors.borrow().is_empty());

	let inserted = rig.surface.insert(MemoryCounter::rendered(2, None));
	assert_eq!(inserted.count_text(), "2");
}

#[test]
fn teardown_cancels_and_detaches() {
	let rig = Rig::new();
	let counter = rig.surface.add(MemoryCounter::rendered(2, None));
	let controller = rig.start(config());

	controller.schedule_update();
	controller.teardown();
	assert_eq!(rig.events.listener_count(), 0);
	rig.timers.advance(5000);
	assert_eq!(rig.provider.calls(), 0);

	rig.events.emit("added_to_cart");
	controller.schedule_update();
	rig.timers.advance(5000);
	assert_eq!(rig.provider.calls(), 0);

	rig.cache(9, "$90.00", 0);
	let inserted = rig.surface.insert(MemoryCounter::rendered(2, None));
	assert_eq!(inserted.count_text(), "2");
	assert_eq!(counter.count_text(), "2");
}

#[test]
fn late_completion_after_teardown_is_ignored() {
	let rig = Rig::new();
	let counter = rig.surface.add(MemoryCounter::rendered(2, None));
	let controller = rig.start(config());

	controller.fetch_and_apply();
	controller.teardown();
	rig.provider.resolve(Ok(CartSnapshot::new(8)));
	assert_eq!(counter.count_text(), "2");
	assert!(rig.events.published().is_empty());
}

#[test]
fn dropping_the_controller_detaches_everything() {
	let rig = Rig::new();
	let controller = rig.start(config());
	controller.schedule_update();
	assert_eq!(rig.timers.pending_count(), 1);

	drop(controller);
	assert_eq!(rig.events.listener_count(), 0);
	assert_eq!(rig.timers.pending_count(), 0);
}
