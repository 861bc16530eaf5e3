#![allow(dead_code)]

// std
use std::{
	future,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};
// crates.io
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};
// self
use credential_coordinator::{
	auth::{AuthorizationCode, Credential, ShopId},
	error::Error,
	exchange::{CodeExchanger, ExchangeFuture},
	session::{SessionSource, SourceError, SourceFuture},
	store::{
		ExchangeKey, ExchangeRecord, ExchangeStore, MemoryStore, StoreError, StoreFuture,
		UpsertOutcome,
	},
	url::Url,
};

pub fn shop(value: &str) -> ShopId {
	ShopId::new(value).expect("Shop fixture should be valid.")
}

pub fn redirect_uri() -> Url {
	Url::parse("https://dashboard.example.com/auth/callback")
		.expect("Redirect URI fixture should parse.")
}

pub fn credential(token: &str, issued_at: OffsetDateTime, lifetime: Duration) -> Credential {
	Credential::builder(token)
		.issued_at(issued_at)
		.expires_in(lifetime)
		.build()
		.expect("Credential fixture should build.")
}

/// How a scripted call resolves.
#[derive(Clone, Debug)]
pub enum Step<T> {
	Ok(T),
	Fail(&'static str),
	/// Never resolves; exercises deadlines.
	Hang,
}

/// Scripted [`SessionSource`] with call counters and an optional per-call delay.
pub struct ScriptedSource {
	current: Mutex<Step<Option<Credential>>>,
	refresh: Mutex<Step<Credential>>,
	delay: Option<std::time::Duration>,
	pub current_calls: AtomicUsize,
	pub refresh_calls: AtomicUsize,
}
impl ScriptedSource {
	pub fn new(current: Step<Option<Credential>>, refresh: Step<Credential>) -> Self {
		Self {
			current: Mutex::new(current),
			refresh: Mutex::new(refresh),
			delay: None,
			current_calls: AtomicUsize::new(0),
			refresh_calls: AtomicUsize::new(0),
		}
	}

	pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn set_current(&self, step: Step<Option<Credential>>) {
		*self.current.lock() = step;
	}

	pub fn current_calls(&self) -> usize {
		self.current_calls.load(Ordering::SeqCst)
	}

	pub fn refresh_calls(&self) -> usize {
		self.refresh_calls.load(Ordering::SeqCst)
	}

	async fn resolve<T>(
		delay: Option<std::time::Duration>,
		step: Step<T>,
	) -> Result<T, SourceError> {
		if let Some(delay) = delay {
			tokio::time::sleep(delay).await;
		}

		match step {
			Step::Ok(value) => Ok(value),
			Step::Fail(message) => Err(SourceError::new(message)),
			Step::Hang => future::pending().await,
		}
	}
}
impl SessionSource for ScriptedSource {
	fn current(&self) -> SourceFuture<'_, Option<Credential>> {
		self.current_calls.fetch_add(1, Ordering::SeqCst);

		let step = self.current.lock().clone();

		Box::pin(Self::resolve(self.delay, step))
	}

	fn refresh(&self) -> SourceFuture<'_, Credential> {
		self.refresh_calls.fetch_add(1, Ordering::SeqCst);

		let step = self.refresh.lock().clone();

		Box::pin(Self::resolve(self.delay, step))
	}
}

/// How [`MockExchanger`] answers.
#[derive(Clone, Debug)]
pub enum ExchangeBehavior {
	/// Issues `token-{n}` where `n` counts calls.
	Issue,
	/// Rejects the code as already used.
	Reject,
	/// Simulates a concurrent winner: stores a record first, then rejects.
	WinnerThenReject(MemoryStore, Credential),
}

/// Counting [`CodeExchanger`] double.
pub struct MockExchanger {
	behavior: ExchangeBehavior,
	delay: Option<std::time::Duration>,
	pub calls: AtomicUsize,
}
impl MockExchanger {
	pub fn new(behavior: ExchangeBehavior) -> Self {
		Self { behavior, delay: None, calls: AtomicUsize::new(0) }
	}

	pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl CodeExchanger for MockExchanger {
	fn exchange_code<'a>(
		&'a self,
		shop: &'a ShopId,
		code: &'a AuthorizationCode,
		_redirect_uri: &'a Url,
	) -> ExchangeFuture<'a> {
		let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

		Box::pin(async move {
			if let Some(delay) = self.delay {
				tokio::time::sleep(delay).await;
			}

			match &self.behavior {
				ExchangeBehavior::Issue => {
					let token = format!("token-{n}");

					Ok(credential(&token, OffsetDateTime::now_utc(), Duration::days(1)))
				},
				ExchangeBehavior::Reject => Err(rejection()),
				ExchangeBehavior::WinnerThenReject(store, winner) => {
					let record = ExchangeRecord {
						key: ExchangeKey::derive(shop, code),
						shop: shop.clone(),
						credential: winner.clone(),
						stored_at: OffsetDateTime::now_utc(),
					};

					if let Err(e) = store.upsert(record).await {
						return Err(Error::from(e));
					}

					Err(rejection())
				},
			}
		})
	}
}

pub fn rejection() -> Error {
	Error::Provider {
		code: "invalid_request".into(),
		description: Some("The authorization code was not found or was already used".into()),
		status: Some(400),
	}
}

/// Store whose every operation fails, for fail-closed checks.
pub struct BrokenStore {
	pub upserts: Arc<AtomicUsize>,
}
impl BrokenStore {
	pub fn new() -> Self {
		Self { upserts: Default::default() }
	}

	fn down() -> StoreError {
		StoreError::Backend { message: "database unreachable".into() }
	}
}
impl ExchangeStore for BrokenStore {
	fn fetch<'a>(&'a self, _key: &'a ExchangeKey) -> StoreFuture<'a, Option<ExchangeRecord>> {
		Box::pin(async { Err(Self::down()) })
	}

	fn upsert(&self, _record: ExchangeRecord) -> StoreFuture<'_, UpsertOutcome> {
		self.upserts.fetch_add(1, Ordering::SeqCst);

		Box::pin(async { Err(Self::down()) })
	}

	fn prune_before(&self, _cutoff: OffsetDateTime) -> StoreFuture<'_, usize> {
		Box::pin(async { Err(Self::down()) })
	}
}

/// Store whose operations never resolve, for store-deadline checks.
#[derive(Default)]
pub struct HangingStore {
	pub fetches: AtomicUsize,
}
impl HangingStore {
	pub fn fetches(&self) -> usize {
		self.fetches.load(Ordering::SeqCst)
	}
}
impl ExchangeStore for HangingStore {
	fn fetch<'a>(&'a self, _key: &'a ExchangeKey) -> StoreFuture<'a, Option<ExchangeRecord>> {
		self.fetches.fetch_add(1, Ordering::SeqCst);

		Box::pin(future::pending())
	}

	fn upsert(&self, _record: ExchangeRecord) -> StoreFuture<'_, UpsertOutcome> {
		Box::pin(future::pending())
	}

	fn prune_before(&self, _cutoff: OffsetDateTime) -> StoreFuture<'_, usize> {
		Box::pin(future::pending())
	}
}
