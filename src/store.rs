//! Durable store contract for exchange records plus built-in implementations.
//!
//! The store is the only arbiter of exchange consistency across processes: its upsert must be
//! keyed on a unique [`ExchangeKey`] so that two instances racing on the same authorization code
//! leave exactly one record behind.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	auth::{AuthorizationCode, Credential, ShopId},
};

/// Boxed future returned by [`ExchangeStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Storage backend contract for exchange records.
pub trait ExchangeStore
where
	Self: Send + Sync,
{
	/// Fetches the record stored under `key`, if present.
	fn fetch<'a>(&'a self, key: &'a ExchangeKey) -> StoreFuture<'a, Option<ExchangeRecord>>;

	/// Inserts `record` unless its key already exists.
	///
	/// On conflict the stored record is left untouched and returned, so the first writer wins
	/// deterministically at the storage layer.
	fn upsert(&self, record: ExchangeRecord) -> StoreFuture<'_, UpsertOutcome>;

	/// Deletes every record stored before `cutoff`, returning how many were removed.
	fn prune_before(&self, cutoff: OffsetDateTime) -> StoreFuture<'_, usize>;
}

/// Result of an [`ExchangeStore::upsert`] call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertOutcome {
	/// The record was written.
	Inserted,
	/// Another writer already stored a record under the key; it is returned unchanged.
	Existing(ExchangeRecord),
}

/// Error type produced by [`ExchangeStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

/// Content-addressed key for an exchange: base64url (no padding) SHA-256 of `shop:code`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExchangeKey(String);
impl ExchangeKey {
	/// Derives the key for a shop/code pair.
	///
	/// Shop identifiers cannot contain `:`, so the preimage is unambiguous.
	pub fn derive(shop: &ShopId, code: &AuthorizationCode) -> Self {
		let mut hasher = Sha256::new();

		hasher.update(shop.as_bytes());
		hasher.update(b":");
		hasher.update(code.expose().as_bytes());

		Self(URL_SAFE_NO_PAD.encode(hasher.finalize()))
	}

	/// Returns the encoded digest.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for ExchangeKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Persisted outcome of one successful upstream redemption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecord {
	/// Unique key the record is stored under.
	pub key: ExchangeKey,
	/// Shop the code was issued for.
	pub shop: ShopId,
	/// Credential issued by the provider.
	pub credential: Credential,
	/// Instant the record was written; drives retention pruning.
	pub stored_at: OffsetDateTime,
}
impl ExchangeRecord {
	/// Returns `true` if the record belongs to `shop`.
	pub fn belongs_to(&self, shop: &ShopId) -> bool {
		&self.shop == shop
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::Error;

	fn shop(value: &str) -> ShopId {
		ShopId::new(value).expect("Shop fixture should be valid.")
	}

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("database unreachable"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn exchange_key_is_stable_and_shop_scoped() {
		let code = AuthorizationCode::new("CODE");
		let a = ExchangeKey::derive(&shop("shopA"), &code);
		let a_again = ExchangeKey::derive(&shop("shopA"), &AuthorizationCode::new("CODE"));
		let b = ExchangeKey::derive(&shop("shopB"), &code);

		assert_eq!(a, a_again);
		assert_ne!(a, b);
		assert_eq!(a.as_str().len(), 43, "SHA-256 digests encode to 43 base64url characters.");
		assert!(!a.as_str().contains("CODE"));
	}

	#[test]
	fn upsert_outcome_can_be_serialized() {
		let payload = serde_json::to_string(&UpsertOutcome::Inserted)
			.expect("UpsertOutcome should serialize to JSON.");

		assert_eq!(payload, "\"Inserted\"");
	}
}
