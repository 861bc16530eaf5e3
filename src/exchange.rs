//! Exactly-once authorization code exchange backed by a content-addressed durable cache.
//!
//! Authorization codes are single-use: the provider rejects a second redemption. Callback
//! handlers still see duplicates (double-submitted forms, retried requests, replayed
//! webhooks), so [`ExchangeCache::exchange`] consults the [`ExchangeStore`] under a key derived
//! from `shop:code` before contacting the provider, and persists the issued credential with a
//! unique-key upsert afterwards. Inside one process, callers for the same key serialize on a
//! singleflight guard; across processes the store's upsert decides the winner, and a provider
//! rejection triggers exactly one re-read in case a concurrent winner just wrote the record.
//! The provider is called at most once per invocation and never retried here.

mod metrics;

#[cfg(feature = "reqwest")] pub mod http;

pub use metrics::ExchangeMetrics;

#[cfg(feature = "reqwest")] pub use http::ReqwestCodeExchanger;

// self
use crate::{
	_prelude::*,
	auth::{AuthorizationCode, Credential, ShopId},
	clock::{Clock, non_negative},
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::{ExchangeKey, ExchangeRecord, ExchangeStore, StoreFuture, UpsertOutcome},
	timeout,
};

/// Boxed future returned by [`CodeExchanger::exchange_code`].
pub type ExchangeFuture<'a> = Pin<Box<dyn Future<Output = Result<Credential>> + 'a + Send>>;

/// Provider endpoint that redeems an authorization code for a credential.
pub trait CodeExchanger
where
	Self: Send + Sync,
{
	/// Redeems `code` for `shop`.
	///
	/// Explicit rejections must surface as [`Error::Provider`] so the cache can distinguish them
	/// from transport failures.
	fn exchange_code<'a>(
		&'a self,
		shop: &'a ShopId,
		code: &'a AuthorizationCode,
		redirect_uri: &'a Url,
	) -> ExchangeFuture<'a>;
}

/// Tunables for [`ExchangeCache`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
	/// Deadline for the provider call.
	pub exchange_timeout: Duration,
	/// Deadline for each durable store read, write, or prune.
	pub store_timeout: Duration,
	/// Age after which stored records are garbage-collected.
	pub retention: Duration,
	/// Runs a prune pass after every successful insert.
	pub prune_on_insert: bool,
}
impl ExchangeConfig {
	const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::seconds(10);
	const DEFAULT_RETENTION: Duration = Duration::hours(24);
	const DEFAULT_STORE_TIMEOUT: Duration = Duration::seconds(5);

	/// Overrides the provider deadline (defaults to 10 seconds).
	pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
		self.exchange_timeout = non_negative(timeout);

		self
	}

	/// Overrides the store deadline (defaults to 5 seconds).
	pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
		self.store_timeout = non_negative(timeout);

		self
	}

	/// Overrides the retention window (defaults to 24 hours).
	pub fn with_retention(mut self, retention: Duration) -> Self {
		self.retention = non_negative(retention);

		self
	}

	/// Enables or disables pruning after inserts.
	pub fn with_prune_on_insert(mut self, enabled: bool) -> Self {
		self.prune_on_insert = enabled;

		self
	}
}
impl Default for ExchangeConfig {
	fn default() -> Self {
		Self {
			exchange_timeout: Self::DEFAULT_EXCHANGE_TIMEOUT,
			store_timeout: Self::DEFAULT_STORE_TIMEOUT,
			retention: Self::DEFAULT_RETENTION,
			prune_on_insert: true,
		}
	}
}

/// How [`ExchangeCache::exchange`] obtained its credential.
#[derive(Debug, PartialEq, Eq)]
enum Redemption {
	/// Served from the store without contacting the provider.
	Cached(Credential),
	/// Issued by the provider, or recovered from a concurrent winner.
	Redeemed(Credential),
}
impl Redemption {
	fn outcome(&self) -> OpOutcome {
		match self {
			Self::Cached(_) => OpOutcome::Cached,
			Self::Redeemed(_) => OpOutcome::Success,
		}
	}

	fn into_credential(self) -> Credential {
		match self {
			Self::Cached(credential) | Self::Redeemed(credential) => credential,
		}
	}
}

type GuardMap = Arc<Mutex<HashMap<ExchangeKey, Arc<AsyncMutex<()>>>>>;

/// Idempotent front for a [`CodeExchanger`].
#[derive(Clone)]
pub struct ExchangeCache {
	store: Arc<dyn ExchangeStore>,
	exchanger: Arc<dyn CodeExchanger>,
	clock: Arc<dyn Clock>,
	config: ExchangeConfig,
	metrics: Arc<ExchangeMetrics>,
	guards: GuardMap,
}
impl ExchangeCache {
	/// Creates a cache that checks `store` before calling `exchanger`.
	pub fn new(
		store: Arc<dyn ExchangeStore>,
		exchanger: Arc<dyn CodeExchanger>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			store,
			exchanger,
			clock,
			config: ExchangeConfig::default(),
			metrics: Default::default(),
			guards: Default::default(),
		}
	}

	/// Replaces the configuration.
	pub fn with_config(mut self, config: ExchangeConfig) -> Self {
		self.config = config;

		self
	}

	/// Returns the shared counters.
	pub fn metrics(&self) -> &ExchangeMetrics {
		&self.metrics
	}

	/// Redeems `code` for `shop` at most once, returning the cached credential on repeats.
	pub async fn exchange(
		&self,
		shop: &ShopId,
		code: &AuthorizationCode,
		redirect_uri: &Url,
	) -> Result<Credential> {
		const KIND: OpKind = OpKind::CodeExchange;

		let span = OpSpan::new(KIND, "exchange");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);
		self.metrics.record_attempt();

		let result = span
			.instrument(async move {
				let key = ExchangeKey::derive(shop, code);
				let lease = GuardLease::acquire(&self.guards, &key);
				let _singleflight = lease.guard.lock().await;

				self.redeem_once(&key, shop, code, redirect_uri).await
			})
			.await;

		match &result {
			Ok(redemption) => obs::record_op_outcome(KIND, redemption.outcome()),
			Err(_) => {
				self.metrics.record_failure();
				obs::record_op_outcome(KIND, OpOutcome::Failure);
			},
		}

		result.map(Redemption::into_credential)
	}

	/// Deletes records older than the retention window, returning how many were removed.
	pub async fn prune(&self) -> Result<usize> {
		let cutoff = self.clock.now() - self.config.retention;

		self.bounded_store("exchange.store.prune", self.store.prune_before(cutoff)).await
	}

	/// Bounds one store call; a timeout surfaces as [`Error::Timeout`].
	async fn bounded_store<T>(&self, label: &'static str, call: StoreFuture<'_, T>) -> Result<T> {
		Ok(timeout::with_deadline(self.clock.as_ref(), label, self.config.store_timeout, call)
			.await??)
	}

	async fn redeem_once(
		&self,
		key: &ExchangeKey,
		shop: &ShopId,
		code: &AuthorizationCode,
		redirect_uri: &Url,
	) -> Result<Redemption> {
		// Fail closed: a store error or timeout must never let a duplicate reach the provider.
		let stored = self.bounded_store("exchange.store.fetch", self.store.fetch(key)).await?;

		if let Some(record) = stored.filter(|r| r.belongs_to(shop)) {
			self.metrics.record_cache_hit();

			return Ok(Redemption::Cached(record.credential));
		}

		self.metrics.record_provider_call();

		let issued = timeout::with_deadline(
			self.clock.as_ref(),
			"exchange.provider",
			self.config.exchange_timeout,
			self.exchanger.exchange_code(shop, code, redirect_uri),
		)
		.await?;
		let credential = match issued {
			Ok(credential) => credential,
			Err(rejection @ Error::Provider { .. }) =>
				return self.read_through(key, shop, rejection).await.map(Redemption::Redeemed),
			Err(e) => return Err(e),
		};
		let record = ExchangeRecord {
			key: key.clone(),
			shop: shop.clone(),
			credential: credential.clone(),
			stored_at: self.clock.now(),
		};

		let credential =
			match self.bounded_store("exchange.store.upsert", self.store.upsert(record)).await? {
				UpsertOutcome::Inserted => {
					self.prune_best_effort().await;

					credential
				},
				UpsertOutcome::Existing(existing) if existing.belongs_to(shop) =>
					existing.credential,
				UpsertOutcome::Existing(_) => credential,
			};

		Ok(Redemption::Redeemed(credential))
	}

	/// A concurrent winner may have redeemed the code and written the record just before the
	/// provider rejected our attempt; re-read once before surfacing the rejection.
	async fn read_through(
		&self,
		key: &ExchangeKey,
		shop: &ShopId,
		rejection: Error,
	) -> Result<Credential> {
		match self.bounded_store("exchange.store.fetch", self.store.fetch(key)).await {
			Ok(Some(record)) if record.belongs_to(shop) => {
				self.metrics.record_recovered();

				Ok(record.credential)
			},
			Ok(_) => Err(rejection),
			Err(e) => {
				obs::record_swallowed(OpKind::CodeExchange, "read_through", &e);

				Err(rejection)
			},
		}
	}

	async fn prune_best_effort(&self) {
		if !self.config.prune_on_insert {
			return;
		}
		if let Err(e) = self.prune().await {
			obs::record_swallowed(OpKind::CodeExchange, "prune", &e);
		}
	}
}
impl Debug for ExchangeCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ExchangeCache")
			.field("config", &self.config)
			.field("pending_keys", &self.guards.lock().len())
			.finish()
	}
}

/// Per-key singleflight guard that removes its map entry once no other caller holds it.
struct GuardLease<'a> {
	guards: &'a GuardMap,
	key: ExchangeKey,
	guard: Arc<AsyncMutex<()>>,
}
impl<'a> GuardLease<'a> {
	fn acquire(guards: &'a GuardMap, key: &ExchangeKey) -> Self {
		let guard = guards
			.lock()
			.entry(key.clone())
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone();

		Self { guards, key: key.clone(), guard }
	}
}
impl Drop for GuardLease<'_> {
	fn drop(&mut self) {
		let mut guards = self.guards.lock();

		// One reference lives in the map and one here; anything more is a waiting caller.
		if Arc::strong_count(&self.guard) == 2 {
			guards.remove(&self.key);
		}
	}
}
