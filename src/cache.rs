use crate::{
	host::{Clock, Storage},
	snapshot::{CachedSnapshot, CartSnapshot},
};
use std::rc::Rc;
use tracing::{debug, trace};

/// Entries older than this are treated as absent.
pub const CACHE_TTL_MS: u64 = 300_000;

/// Best-effort, short-lived cross-tab copy of the last applied snapshot.
///
/// Nothing here fails: storage errors and unparsable entries degrade to "no warm cache".
pub struct LocalCache {
	storage: Rc<dyn Storage>,
	clock: Rc<dyn Clock>,
	key: String,
	ttl_ms: u64,
}

impl LocalCache {
	#[must_use]
	pub fn new(storage: Rc<dyn Storage>, clock: Rc<dyn Clock>, key: impl Into<String>) -> Self {
		Self {
			storage,
			clock,
			key: key.into(),
			ttl_ms: CACHE_TTL_MS,
		}
	}

	#[must_use]
	pub fn key(&self) -> &str {
		&self.key
	}

	/// Writes `{count, total, timestamp = now}` under the cache key.
	pub fn store(&self, snapshot: &CartSnapshot) {
		let cached = snapshot.to_cached(self.clock.now_ms());
		let json = match serde_json::to_string(&cached) {
			Ok(json) => json,
			Err(error) => return debug!(%error, "Could not serialize cache entry."),
		};
		match self.storage.set_item(&self.key, &json) {
			Ok(()) => trace!(key = %self.key, count = cached.count, "Stored snapshot."),
			Err(error) => debug!(%error, "Could not store snapshot."),
		}
	}

	/// The stored snapshot, iff it exists and is younger than the TTL.
	#[must_use]
	pub fn read(&self) -> Option<CartSnapshot> {
		let raw = match self.storage.get_item(&self.key) {
			Ok(raw) => raw?,
			Err(error) => {
				debug!(%error, "Could not read snapshot.");
				return None;
			}
		};
		let cached = parse(&raw)?;
		let timestamp = cached.timestamp?;
		let age = self.clock.now_ms().saturating_sub(timestamp);
		if age < self.ttl_ms {
			Some(cached.into())
		} else {
			trace!(age, "Cached snapshot expired.");
			None
		}
	}

	/// Parses a value delivered by a cross-tab notification. The TTL is not checked, since such writes are fresh.
	#[must_use]
	pub fn on_external_change(raw: Option<&str>) -> Option<CartSnapshot> {
		parse(raw?).map(Into::into)
	}
}

fn parse(raw: &str) -> Option<CachedSnapshot> {
	serde_json::from_str(raw).map_err(|error| debug!(%error, "Ignoring unparsable cache entry.")).ok()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::memory::{ManualTimers, MemoryStorage};

	fn cache(timers: &Rc<ManualTimers>, storage: &Rc<MemoryStorage>) -> LocalCache {
		LocalCache::new(Rc::clone(storage) as Rc<dyn Storage>, Rc::clone(timers) as Rc<dyn Clock>, "key")
	}

	#[test]
	fn expires_after_ttl() {
		let timers = Rc::new(ManualTimers::starting_at(1_000_000));
		let storage = Rc::new(MemoryStorage::new());
		let cache = cache(&timers, &storage);

		cache.store(&CartSnapshot::new(3).with_total("$29.99"));
		timers.advance(CACHE_TTL_MS - 1);
		assert_eq!(cache.read().map(|snapshot| snapshot.count), Some(3));

		timers.advance(1);
		assert_eq!(cache.read(), None);
	}

	#[test]
	fn threshold_from_stored_timestamps() {
		let timers = Rc::new(ManualTimers::starting_at(10_000_000));
		let storage = Rc::new(MemoryStorage::new());
		let cache = cache(&timers, &storage);

		storage.insert("key", &format!(r#"{{"count":1,"timestamp":{}}}"#, 10_000_000 - CACHE_TTL_MS - 1));
		assert_eq!(cache.read(), None);

		storage.insert("key", &format!(r#"{{"count":1,"total":"$1","timestamp":{}}}"#, 10_000_000 - CACHE_TTL_MS + 1));
		assert_eq!(cache.read(), Some(CartSnapshot { timestamp: Some(10_000_000 - CACHE_TTL_MS + 1), ..CartSnapshot::new(1).with_total("$1") }));
	}

	#[test]
	fn garbage_and_untimed_entries_are_absent() {
		let timers = Rc::new(ManualTimers::new());
		let storage = Rc::new(MemoryStorage::new());
		let cache = cache(&timers, &storage);

		storage.insert("key", "{not json");
		assert_eq!(cache.read(), None);
		storage.insert("key", r#"{"count":2}"#);
		assert_eq!(cache.read(), None);
		storage.insert("key", r#"{"count":-2,"timestamp":0}"#);
		assert_eq!(cache.read(), None);
	}

	#[test]
	fn unavailable_storage_is_swallowed() {
		let timers = Rc::new(ManualTimers::new());
		let storage = Rc::new(MemoryStorage::new());
		let cache = cache(&timers, &storage);

		storage.set_available(false);
		cache.store(&CartSnapshot::new(5));
		assert_eq!(cache.read(), None);

		storage.set_available(true);
		assert_eq!(storage.get("key"), None);
	}

	#[test]
	fn external_changes_skip_the_ttl() {
		assert_eq!(LocalCache::on_external_change(Some(r#"{"count":7,"timestamp":0}"#)).map(|snapshot| snapshot.count), Some(7));
		assert_eq!(LocalCache::on_external_change(Some("")), None);
		assert_eq!(LocalCache::on_external_change(None), None);
	}
}
