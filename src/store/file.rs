//! File-backed [`ExchangeStore`] so exchange records survive process restarts.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{ExchangeKey, ExchangeRecord, ExchangeStore, StoreError, StoreFuture, UpsertOutcome},
};

/// Persists exchange records to a JSON file after each mutation.
///
/// Writes go to a sibling `.tmp` file that is synced and renamed over the snapshot, so a crash
/// leaves either the previous or the new snapshot on disk.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	inner: Arc<RwLock<HashMap<ExchangeKey, ExchangeRecord>>>,
}
impl FileStore {
	/// Opens (or creates) a store at the provided path, eagerly loading existing data.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let snapshot = Self::load_snapshot(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(snapshot)) })
	}

	fn load_snapshot(path: &Path) -> Result<HashMap<ExchangeKey, ExchangeRecord>, StoreError> {
		if !path.exists() {
			return Ok(HashMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(HashMap::new());
		}

		let records: Vec<ExchangeRecord> =
			serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
				message: format!("Failed to parse {}: {e}", path.display()),
			})?;

		Ok(records.into_iter().map(|record| (record.key.clone(), record)).collect())
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(
		&self,
		contents: &HashMap<ExchangeKey, ExchangeRecord>,
	) -> Result<(), StoreError> {
		let mut snapshot: Vec<_> = contents.values().collect();

		snapshot.sort_by(|a, b| a.key.cmp(&b.key));

		let serialized =
			serde_json::to_vec_pretty(&snapshot).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize store snapshot: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl ExchangeStore for FileStore {
	fn fetch<'a>(&'a self, key: &'a ExchangeKey) -> StoreFuture<'a, Option<ExchangeRecord>> {
		Box::pin(async move { Ok(self.inner.read().get(key).cloned()) })
	}

	fn upsert(&self, record: ExchangeRecord) -> StoreFuture<'_, UpsertOutcome> {
		Box::pin(async move {
			let mut guard = self.inner.write();

			if let Some(existing) = guard.get(&record.key) {
				return Ok(UpsertOutcome::Existing(existing.clone()));
			}

			let key = record.key.clone();

			guard.insert(key.clone(), record);

			// Roll back so memory never claims a record the disk does not hold.
			if let Err(e) = self.persist_locked(&guard) {
				guard.remove(&key);

				return Err(e);
			}

			Ok(UpsertOutcome::Inserted)
		})
	}

	fn prune_before(&self, cutoff: OffsetDateTime) -> StoreFuture<'_, usize> {
		Box::pin(async move {
			let mut guard = self.inner.write();
			let before = guard.len();

			guard.retain(|_, record| record.stored_at >= cutoff);

			let removed = before - guard.len();

			if removed > 0 {
				self.persist_locked(&guard)?;
			}

			Ok(removed)
		})
	}
}
