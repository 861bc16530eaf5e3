//! Thread-safe in-memory [`ExchangeStore`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{ExchangeKey, ExchangeRecord, ExchangeStore, StoreError, StoreFuture, UpsertOutcome},
};

type StoreMap = Arc<RwLock<HashMap<ExchangeKey, ExchangeRecord>>>;

/// Thread-safe storage backend that keeps records in-process for tests and demos.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(StoreMap);
impl MemoryStore {
	/// Number of stored records.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` if nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn upsert_now(map: StoreMap, record: ExchangeRecord) -> Result<UpsertOutcome, StoreError> {
		let mut guard = map.write();

		if let Some(existing) = guard.get(&record.key) {
			return Ok(UpsertOutcome::Existing(existing.clone()));
		}

		guard.insert(record.key.clone(), record);

		Ok(UpsertOutcome::Inserted)
	}

	fn prune_now(map: StoreMap, cutoff: OffsetDateTime) -> usize {
		let mut guard = map.write();
		let before = guard.len();

		guard.retain(|_, record| record.stored_at >= cutoff);

		before - guard.len()
	}
}
impl ExchangeStore for MemoryStore {
	fn fetch<'a>(&'a self, key: &'a ExchangeKey) -> StoreFuture<'a, Option<ExchangeRecord>> {
		let map = self.0.clone();

		Box::pin(async move { Ok(map.read().get(key).cloned()) })
	}

	fn upsert(&self, record: ExchangeRecord) -> StoreFuture<'_, UpsertOutcome> {
		let map = self.0.clone();

		Box::pin(async move { Self::upsert_now(map, record) })
	}

	fn prune_before(&self, cutoff: OffsetDateTime) -> StoreFuture<'_, usize> {
		let map = self.0.clone();

		Box::pin(async move { Ok(Self::prune_now(map, cutoff)) })
	}
}
