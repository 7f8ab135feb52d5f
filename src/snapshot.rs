use hashbrown::HashMap;
use serde::{de::IgnoredAny, Deserialize, Deserializer, Serialize};

/// A point-in-time description of the cart as reported by the provider or read from the cache.
///
/// Snapshots are applied in arrival order. [`timestamp`](`CartSnapshot::timestamp`) only decides cache expiry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CartSnapshot {
	/// Number of items in the cart.
	pub count: u32,

	/// Formatted total, as trusted markup. Opaque to this crate.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total: Option<String>,

	/// CSS selector → replacement markup.
	#[serde(default, skip_serializing_if = "HashMap::is_empty", deserialize_with = "fragment_map")]
	pub fragments: HashMap<String, String>,

	/// Milliseconds since the Unix epoch at capture time.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub timestamp: Option<u64>,
}

impl CartSnapshot {
	#[must_use]
	pub fn new(count: u32) -> Self {
		Self { count, ..Self::default() }
	}

	#[must_use]
	pub fn with_total(mut self, total: impl Into<String>) -> Self {
		self.total = Some(total.into());
		self
	}

	#[must_use]
	pub fn with_fragment(mut self, selector: impl Into<String>, markup: impl Into<String>) -> Self {
		self.fragments.insert(selector.into(), markup.into());
		self
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.count == 0
	}

	/// The part of the snapshot that is shared between tabs.
	#[must_use]
	pub fn to_cached(&self, timestamp: u64) -> CachedSnapshot {
		CachedSnapshot {
			count: self.count,
			total: self.total.clone(),
			timestamp: Some(timestamp),
		}
	}
}

/// PHP encodes an empty associative array as `[]`.
fn fragment_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HashMap<String, String>, D::Error> {
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum Fragments {
		Map(HashMap<String, String>),
		List(Vec<IgnoredAny>),
	}

	match Option::<Fragments>::deserialize(deserializer)? {
		Some(Fragments::Map(map)) => Ok(map),
		Some(Fragments::List(list)) if list.is_empty() => Ok(HashMap::new()),
		Some(Fragments::List(list)) => Err(serde::de::Error::invalid_length(list.len(), &"a map of fragments")),
		None => Ok(HashMap::new()),
	}
}

/// The cross-tab cache entry: `{"count":3,"total":"…","timestamp":1700000000000}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSnapshot {
	pub count: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total: Option<String>,
	#[serde(default)]
	pub timestamp: Option<u64>,
}

impl From<CachedSnapshot> for CartSnapshot {
	fn from(cached: CachedSnapshot) -> Self {
		Self {
			count: cached.count,
			total: cached.total,
			fragments: HashMap::new(),
			timestamp: cached.timestamp,
		}
	}
}

/// Change of the displayed count between two applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountChange {
	Increase,
	Decrease,
}

impl CountChange {
	/// [`None`] if `previous` is unknown or equal to `current`.
	#[must_use]
	pub fn between(previous: Option<u32>, current: u32) -> Option<Self> {
		match previous {
			Some(previous) if current > previous => Some(Self::Increase),
			Some(previous) if current < previous => Some(Self::Decrease),
			_ => None,
		}
	}
}
