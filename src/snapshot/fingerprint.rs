//! Deterministic cache keys for snapshot queries.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, auth::ShopId, error::ConfigError};

/// Opaque cache key derived from query parameters.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);
impl Fingerprint {
	/// Hashes the JSON encoding of `params`.
	///
	/// Map keys are sorted before hashing, so `HashMap` parameters fingerprint the same on every
	/// run. Sequences keep their order: a `HashSet` iterates differently per process and must be
	/// replaced with a `BTreeSet` (as [`SnapshotQuery`] does) to stay deterministic.
	pub fn of<T>(params: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		let encoded = serde_json::to_value(params)
			.and_then(|value| serde_json::to_vec(&SortedKeys(&value)))
			.map_err(|source| ConfigError::UnserializableQuery { source })?;

		Ok(Self(URL_SAFE_NO_PAD.encode(Sha256::digest(&encoded))))
	}

	/// Returns the encoded fingerprint.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Debug for Fingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Fingerprint({})", self.0)
	}
}
impl Display for Fingerprint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Serializes a JSON value with every object's keys in ascending order.
struct SortedKeys<'a>(&'a serde_json::Value);
impl Serialize for SortedKeys<'_> {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		// crates.io
		use serde::ser::{SerializeMap, SerializeSeq};

		match self.0 {
			serde_json::Value::Object(map) => {
				let mut entries = map.iter().collect::<Vec<_>>();

				entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

				let mut out = serializer.serialize_map(Some(entries.len()))?;

				for (key, value) in entries {
					out.serialize_entry(key, &SortedKeys(value))?;
				}

				out.end()
			},
			serde_json::Value::Array(items) => {
				let mut out = serializer.serialize_seq(Some(items.len()))?;

				for item in items {
					out.serialize_element(&SortedKeys(item))?;
				}

				out.end()
			},
			scalar => scalar.serialize(serializer),
		}
	}
}

/// Ready-made parameters for a paginated dashboard query spanning several shops.
///
/// Store sets and filters are kept ordered, so two queries that differ only in insertion order
/// share a fingerprint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotQuery {
	/// Shops the query aggregates over.
	pub stores: BTreeSet<ShopId>,
	/// Free-form filter parameters.
	pub filters: BTreeMap<String, String>,
	/// Pagination cursor; `None` requests the first page.
	pub cursor: Option<String>,
	/// Requested page size.
	pub page_size: u32,
}
impl SnapshotQuery {
	/// Creates an empty query with the given page size.
	pub fn new(page_size: u32) -> Self {
		Self { page_size, ..Default::default() }
	}

	/// Adds a shop to the store set.
	pub fn store(mut self, shop: ShopId) -> Self {
		self.stores.insert(shop);

		self
	}

	/// Adds or replaces a filter parameter.
	pub fn filter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.filters.insert(name.into(), value.into());

		self
	}

	/// Sets the pagination cursor.
	pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
		self.cursor = Some(cursor.into());

		self
	}

	/// Derives the cache key for this query.
	pub fn fingerprint(&self) -> Result<Fingerprint> {
		Fingerprint::of(self)
	}
}
