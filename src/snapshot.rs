//! Bounded, recency-ordered cache for expensive paginated query snapshots.
//!
//! Entries are ordered by when they were produced, not by when they were read: [`RecencyCache::get`]
//! never promotes, and [`RecencyCache::put`] evicts the oldest-produced entries synchronously
//! until the cache fits its capacity again. Ties on `produced_at` fall back to fingerprint order
//! so eviction is reproducible.

mod fingerprint;

pub use fingerprint::*;

// self
use crate::{
	_prelude::*,
	clock::{Clock, non_negative},
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Tunables for [`RecencyCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecencyCacheConfig {
	/// Maximum number of retained snapshots; values below one behave as one.
	pub capacity: usize,
	/// Entries older than this are reported as absent by reads.
	pub max_age: Option<Duration>,
}
impl RecencyCacheConfig {
	const DEFAULT_CAPACITY: usize = 5;

	/// Overrides the capacity (defaults to 5, clamped to at least 1).
	pub fn with_capacity(mut self, capacity: usize) -> Self {
		self.capacity = capacity.max(1);

		self
	}

	/// Hides entries older than `max_age` from reads.
	pub fn with_max_age(mut self, max_age: Duration) -> Self {
		self.max_age = Some(non_negative(max_age));

		self
	}
}
impl Default for RecencyCacheConfig {
	fn default() -> Self {
		Self { capacity: Self::DEFAULT_CAPACITY, max_age: None }
	}
}

/// Snapshot returned from the cache.
#[derive(Debug)]
pub struct CachedSnapshot<V> {
	/// Key the snapshot is stored under.
	pub fingerprint: Fingerprint,
	/// Shared snapshot payload.
	pub snapshot: Arc<V>,
	/// Instant the snapshot was produced (stored).
	pub produced_at: OffsetDateTime,
}
impl<V> Clone for CachedSnapshot<V> {
	fn clone(&self) -> Self {
		Self {
			fingerprint: self.fingerprint.clone(),
			snapshot: self.snapshot.clone(),
			produced_at: self.produced_at,
		}
	}
}

#[derive(Debug)]
struct Entry<V> {
	snapshot: Arc<V>,
	produced_at: OffsetDateTime,
}

/// Fixed-capacity snapshot cache evicting the least recently produced entry.
pub struct RecencyCache<V> {
	config: RecencyCacheConfig,
	clock: Arc<dyn Clock>,
	entries: Mutex<BTreeMap<Fingerprint, Entry<V>>>,
}
impl<V> RecencyCache<V>
where
	V: Send + Sync,
{
	/// Creates a cache with the default capacity of five.
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self::with_config(clock, RecencyCacheConfig::default())
	}

	/// Creates a cache with an explicit configuration.
	pub fn with_config(clock: Arc<dyn Clock>, config: RecencyCacheConfig) -> Self {
		let config = RecencyCacheConfig { capacity: config.capacity.max(1), ..config };

		Self { config, clock, entries: Default::default() }
	}

	/// Returns the effective configuration.
	pub fn config(&self) -> &RecencyCacheConfig {
		&self.config
	}

	/// Looks up a snapshot without promoting or evicting anything.
	pub fn get(&self, fingerprint: &Fingerprint) -> Option<CachedSnapshot<V>> {
		let now = self.clock.now();
		let entries = self.entries.lock();
		let entry = entries.get(fingerprint)?;

		if let Some(max_age) = self.config.max_age {
			if now - entry.produced_at > max_age {
				return None;
			}
		}

		Some(CachedSnapshot {
			fingerprint: fingerprint.clone(),
			snapshot: entry.snapshot.clone(),
			produced_at: entry.produced_at,
		})
	}

	/// Stores `snapshot` with a fresh `produced_at`, then evicts until the cache fits.
	///
	/// Returns the evicted fingerprints, oldest first.
	pub fn put(&self, fingerprint: Fingerprint, snapshot: V) -> Vec<Fingerprint> {
		self.insert(fingerprint, Arc::new(snapshot)).1
	}

	/// Returns the cached snapshot, or runs `fetch` on a miss and caches its result.
	///
	/// Fetch errors are returned as-is and nothing is cached. Concurrent misses for the same
	/// fingerprint each run their own fetch; the last one to finish wins.
	pub async fn get_or_fetch<F, Fut>(
		&self,
		fingerprint: Fingerprint,
		fetch: F,
	) -> Result<CachedSnapshot<V>>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<V>>,
	{
		const KIND: OpKind = OpKind::SnapshotFetch;

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		if let Some(hit) = self.get(&fingerprint) {
			obs::record_op_outcome(KIND, OpOutcome::Cached);

			return Ok(hit);
		}

		let fetched = OpSpan::new(KIND, "fetch").instrument(fetch()).await;

		match fetched {
			Ok(snapshot) => {
				obs::record_op_outcome(KIND, OpOutcome::Success);

				Ok(self.insert(fingerprint, Arc::new(snapshot)).0)
			},
			Err(e) => {
				obs::record_op_outcome(KIND, OpOutcome::Failure);

				Err(e)
			},
		}
	}

	/// Drops the entry for `fingerprint`, returning whether one existed.
	pub fn remove(&self, fingerprint: &Fingerprint) -> bool {
		self.entries.lock().remove(fingerprint).is_some()
	}

	/// Drops every entry.
	pub fn clear(&self) {
		self.entries.lock().clear();
	}

	/// Number of stored entries, including ones hidden by `max_age`.
	pub fn len(&self) -> usize {
		self.entries.lock().len()
	}

	/// Whether the cache holds no entries.
	pub fn is_empty(&self) -> bool {
		self.entries.lock().is_empty()
	}

	/// Stored fingerprints in eviction order (next victim first).
	pub fn fingerprints(&self) -> Vec<Fingerprint> {
		let entries = self.entries.lock();
		let mut order = entries
			.iter()
			.map(|(fingerprint, entry)| (entry.produced_at, fingerprint.clone()))
			.collect::<Vec<_>>();

		order.sort();

		order.into_iter().map(|(_, fingerprint)| fingerprint).collect()
	}

	fn insert(
		&self,
		fingerprint: Fingerprint,
		snapshot: Arc<V>,
	) -> (CachedSnapshot<V>, Vec<Fingerprint>) {
		let produced_at = self.clock.now();
		let mut entries = self.entries.lock();

		entries.insert(fingerprint.clone(), Entry { snapshot: snapshot.clone(), produced_at });

		let mut evicted = Vec::new();

		while entries.len() > self.config.capacity {
			let victim = entries
				.iter()
				.min_by(|(a_key, a), (b_key, b)| {
					(a.produced_at, *a_key).cmp(&(b.produced_at, *b_key))
				})
				.map(|(key, _)| key.clone());
			let Some(victim) = victim else { break };

			entries.remove(&victim);
			evicted.push(victim);
		}

		(CachedSnapshot { fingerprint, snapshot, produced_at }, evicted)
	}
}
impl<V> Debug for RecencyCache<V> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RecencyCache")
			.field("config", &self.config)
			.field("len", &self.entries.lock().len())
			.finish()
	}
}
