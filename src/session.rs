//! Session validity coordination with TTL caching, singleflight verification, and proactive
//! pre-expiry renewal.
//!
//! [`SessionCoordinator::ensure_valid`] answers "is my credential still good?" for every caller
//! that is about to issue a data request. Within the TTL window the last verified credential is
//! returned without any upstream call. Outside it, the first caller starts a verification
//! (fetch, one silent refresh when absent, one proactive refresh near expiry) and records it as
//! the in-flight handle; every concurrent caller awaits that same shared future, so N callers
//! produce exactly one verification sequence. Upstream failures and timeouts never escape as
//! errors: they resolve to [`SessionValidity::Unavailable`] so a transient auth hiccup cannot
//! cascade into request failures.

mod config;
mod metrics;

pub use config::*;
pub use metrics::SessionMetrics;

// crates.io
use futures::future::{self, BoxFuture, Either, FutureExt, Shared};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	clock::{Clock, ClockFuture},
	obs::{self, OpKind, OpOutcome, OpSpan},
	timeout::{self, Elapsed},
};

/// Boxed future returned by [`SessionSource`] operations.
pub type SourceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SourceError>> + 'a + Send>>;

/// External credential service consumed by the coordinator.
pub trait SessionSource
where
	Self: Send + Sync,
{
	/// Returns the current credential, or `None` when no session exists.
	fn current(&self) -> SourceFuture<'_, Option<Credential>>;

	/// Silently refreshes the session and returns the new credential.
	fn refresh(&self) -> SourceFuture<'_, Credential>;
}

/// Failure reported by a [`SessionSource`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Credential service failed: {message}.")]
pub struct SourceError {
	/// Human-readable error payload.
	pub message: String,
}
impl SourceError {
	/// Creates a new source error.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// Verification step that produced an [`UnavailableCause`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VerificationStage {
	/// Fetching the current credential.
	Fetch,
	/// Silent refresh after the credential was absent.
	Refresh,
	/// Re-fetching after the silent refresh.
	Refetch,
}
impl VerificationStage {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			VerificationStage::Fetch => "session.fetch",
			VerificationStage::Refresh => "session.refresh",
			VerificationStage::Refetch => "session.refetch",
		}
	}
}

/// Why a verification ended without a credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnavailableCause {
	/// A bounded call exceeded its deadline (slow network rather than a hard error).
	TimedOut {
		/// Step that timed out first.
		stage: VerificationStage,
		/// Deadline that was exceeded.
		after: Duration,
	},
	/// The credential service reported a failure.
	Failed {
		/// Step that failed last.
		stage: VerificationStage,
		/// Service-supplied message.
		message: String,
	},
	/// The service answered, but no usable credential exists.
	NoCredential,
}

/// Outcome of [`SessionCoordinator::ensure_valid`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionValidity {
	/// A non-expired credential is available.
	Valid(Credential),
	/// No credential could be obtained; callers should proceed without elevated access.
	Unavailable(UnavailableCause),
}
impl SessionValidity {
	/// Returns the credential when valid.
	pub fn credential(&self) -> Option<&Credential> {
		match self {
			Self::Valid(credential) => Some(credential),
			Self::Unavailable(_) => None,
		}
	}

	/// Returns `true` when a credential is available.
	pub fn is_valid(&self) -> bool {
		matches!(self, Self::Valid(_))
	}

	/// Converts into a `Result` for callers that do want to fail hard.
	pub fn into_result(self) -> Result<Credential> {
		match self {
			Self::Valid(credential) => Ok(credential),
			Self::Unavailable(UnavailableCause::TimedOut { stage, after }) =>
				Err(Elapsed { operation: stage.as_str(), after }.into()),
			Self::Unavailable(_) => Err(Error::Unavailable),
		}
	}
}

type InFlight = Shared<BoxFuture<'static, SessionValidity>>;

#[derive(Default)]
struct SessionCheckState {
	last_verified_at: Option<OffsetDateTime>,
	last_credential: Option<Credential>,
	in_flight: Option<InFlight>,
}
impl SessionCheckState {
	fn fresh_credential(&self, now: OffsetDateTime, ttl: Duration) -> Option<Credential> {
		let verified_at = self.last_verified_at?;
		let credential = self.last_credential.as_ref()?;

		if now - verified_at < ttl && !credential.is_expired_at(now) {
			Some(credential.clone())
		} else {
			None
		}
	}

	fn settle(&mut self, outcome: &SessionValidity, now: OffsetDateTime) {
		if let SessionValidity::Valid(credential) = outcome {
			// Never regress, even if the clock stepped backwards.
			self.last_verified_at = Some(self.last_verified_at.map_or(now, |prev| prev.max(now)));
			self.last_credential = Some(credential.clone());
		}

		self.in_flight = None;
	}
}

/// Process-wide coordinator for session validity checks.
///
/// Cloning shares the same state, so every clone observes the same TTL cache and in-flight
/// verification.
#[derive(Clone)]
pub struct SessionCoordinator {
	source: Arc<dyn SessionSource>,
	clock: Arc<dyn Clock>,
	config: SessionConfig,
	state: Arc<Mutex<SessionCheckState>>,
	metrics: Arc<SessionMetrics>,
}
impl SessionCoordinator {
	/// Creates a coordinator over `source`, timed by `clock`.
	pub fn new(source: Arc<dyn SessionSource>, clock: Arc<dyn Clock>) -> Self {
		Self {
			source,
			clock,
			config: SessionConfig::default(),
			state: Default::default(),
			metrics: Default::default(),
		}
	}

	/// Replaces the timing configuration.
	pub fn with_config(mut self, config: SessionConfig) -> Self {
		self.config = config;

		self
	}

	/// Returns the active configuration.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Returns the shared counters.
	pub fn metrics(&self) -> &SessionMetrics {
		&self.metrics
	}

	/// Instant of the last successful verification, if any.
	pub fn last_verified_at(&self) -> Option<OffsetDateTime> {
		self.state.lock().last_verified_at
	}

	/// Drops the cached credential so the next call re-verifies (e.g. after logout).
	///
	/// `last_verified_at` is kept so it still never regresses. An in-flight verification is not
	/// cancelled.
	pub fn invalidate(&self) {
		self.state.lock().last_credential = None;
	}

	/// Ensures a credential is available, performing at most one concurrent verification.
	pub async fn ensure_valid(&self, request: SessionCheckRequest) -> SessionValidity {
		const KIND: OpKind = OpKind::SessionCheck;

		let span = OpSpan::new(KIND, "ensure_valid");

		obs::record_op_outcome(KIND, OpOutcome::Attempt);
		self.metrics.record_check();

		let pending = {
			let mut state = self.state.lock();
			let fresh = if request.force {
				None
			} else {
				state.fresh_credential(self.clock.now(), self.config.ttl)
			};

			if let Some(credential) = fresh {
				self.metrics.record_cache_hit();
				obs::record_op_outcome(KIND, OpOutcome::Cached);

				return SessionValidity::Valid(credential);
			}

			match &state.in_flight {
				Some(pending) => {
					self.metrics.record_join();

					pending.clone()
				},
				None => {
					let pending = self.start_verification(request).shared();

					state.in_flight = Some(pending.clone());

					pending
				},
			}
		};
		let outcome = span.instrument(pending).await;

		match &outcome {
			SessionValidity::Valid(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			SessionValidity::Unavailable(_) => obs::record_op_outcome(KIND, OpOutcome::Failure),
		}

		outcome
	}

	fn start_verification(
		&self,
		request: SessionCheckRequest,
	) -> BoxFuture<'static, SessionValidity> {
		let budget = request.deadline.unwrap_or(self.config.check_timeout);
		let verification = Verification {
			source: self.source.clone(),
			clock: self.clock.clone(),
			fetch_timeout: self.config.fetch_timeout,
			refresh_timeout: self.config.refresh_timeout,
			low_water_mark: self.config.low_water_mark,
			budget,
			budget_timer: self.clock.sleep(budget),
			budget_spent: false,
			metrics: self.metrics.clone(),
			cause: None,
		};
		let state = self.state.clone();
		let clock = self.clock.clone();

		async move {
			let outcome = verification.run().await;

			state.lock().settle(&outcome, clock.now());

			outcome
		}
		.boxed()
	}
}
impl Debug for SessionCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.state.lock();

		f.debug_struct("SessionCoordinator")
			.field("config", &self.config)
			.field("last_verified_at", &state.last_verified_at)
			.field("in_flight", &state.in_flight.is_some())
			.finish()
	}
}

/// One verification sequence; owns everything it needs so it can be shared as `'static`.
struct Verification {
	source: Arc<dyn SessionSource>,
	clock: Arc<dyn Clock>,
	fetch_timeout: Duration,
	refresh_timeout: Duration,
	low_water_mark: Duration,
	budget: Duration,
	budget_timer: ClockFuture,
	budget_spent: bool,
	metrics: Arc<SessionMetrics>,
	cause: Option<UnavailableCause>,
}
impl Verification {
	async fn run(mut self) -> SessionValidity {
		self.metrics.record_verification();

		let mut current = self.fetch(VerificationStage::Fetch).await;

		if current.is_none() {
			let refreshed = self.refresh(VerificationStage::Refresh).await;

			current = self.fetch(VerificationStage::Refetch).await.or(refreshed);
		}

		let Some(mut credential) = current else {
			self.metrics.record_unavailable();

			return SessionValidity::Unavailable(
				self.cause.unwrap_or(UnavailableCause::NoCredential),
			);
		};

		if credential.expires_within(self.clock.now(), self.low_water_mark) {
			// Best effort: the still-valid credential is kept when the renewal fails.
			if let Some(renewed) = self.refresh(VerificationStage::Refresh).await {
				credential = renewed;
			}
		}

		SessionValidity::Valid(credential)
	}

	/// Runs one source call under its own deadline and whatever remains of the budget.
	///
	/// Returns `None` after recording a timeout. Once the budget fires, later steps are skipped.
	async fn bounded<T>(
		&mut self,
		stage: VerificationStage,
		step: Duration,
		call: SourceFuture<'_, T>,
	) -> Option<Result<T, SourceError>> {
		let raced = {
			let stepped = std::pin::pin!(timeout::with_deadline(
				self.clock.as_ref(),
				stage.as_str(),
				step,
				call,
			));

			match future::select(stepped, &mut self.budget_timer).await {
				Either::Left((outcome, _)) => Some(outcome),
				Either::Right(((), _)) => None,
			}
		};
		let elapsed = match raced {
			Some(Ok(result)) => return Some(result),
			Some(Err(elapsed)) => elapsed,
			None => {
				self.budget_spent = true;

				Elapsed { operation: stage.as_str(), after: self.budget }
			},
		};

		self.note_timeout(stage, elapsed);

		None
	}

	async fn fetch(&mut self, stage: VerificationStage) -> Option<Credential> {
		if self.budget_spent {
			return None;
		}

		let source = self.source.clone();

		match self.bounded(stage, self.fetch_timeout, source.current()).await? {
			Ok(credential) => credential.filter(|c| !c.is_expired_at(self.clock.now())),
			Err(e) => {
				self.note_failure(stage, e);

				None
			},
		}
	}

	async fn refresh(&mut self, stage: VerificationStage) -> Option<Credential> {
		if self.budget_spent {
			return None;
		}

		let source = self.source.clone();

		self.metrics.record_refresh_attempt();

		match self.bounded(stage, self.refresh_timeout, source.refresh()).await? {
			Ok(credential) => Some(credential).filter(|c| !c.is_expired_at(self.clock.now())),
			Err(e) => {
				self.note_failure(stage, e);

				None
			},
		}
	}

	fn note_failure(&mut self, stage: VerificationStage, error: SourceError) {
		obs::record_swallowed(OpKind::SessionCheck, stage.as_str(), &error);

		// A timeout already recorded is the more actionable signal.
		if !matches!(self.cause, Some(UnavailableCause::TimedOut { .. })) {
			self.cause = Some(UnavailableCause::Failed { stage, message: error.message });
		}
	}

	fn note_timeout(&mut self, stage: VerificationStage, elapsed: Elapsed) {
		obs::record_swallowed(OpKind::SessionCheck, stage.as_str(), &elapsed);

		if !matches!(self.cause, Some(UnavailableCause::TimedOut { .. })) {
			self.cause = Some(UnavailableCause::TimedOut { stage, after: elapsed.after });
		}
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use time::macros;
	// self
	use super::*;
	use crate::clock::ManualClock;

	struct FixedSource {
		credential: Option<Credential>,
		calls: AtomicUsize,
	}
	impl SessionSource for FixedSource {
		fn current(&self) -> SourceFuture<'_, Option<Credential>> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			let credential = self.credential.clone();

			Box::pin(async move { Ok(credential) })
		}

		fn refresh(&self) -> SourceFuture<'_, Credential> {
			Box::pin(async { Err(SourceError::new("refresh disabled")) })
		}
	}

	fn credential(expires_at: OffsetDateTime) -> Credential {
		Credential::builder("access")
			.issued_at(expires_at - Duration::hours(1))
			.expires_at(expires_at)
			.build()
			.expect("Credential fixture should build.")
	}

	#[tokio::test]
	async fn ttl_cache_expires_after_window() {
		let start = macros::datetime!(2025-06-01 12:00 UTC);
		let clock = ManualClock::new(start);
		let source = Arc::new(FixedSource {
			credential: Some(credential(start + Duration::hours(1))),
			calls: AtomicUsize::new(0),
		});
		let coordinator = SessionCoordinator::new(source.clone(), Arc::new(clock.clone()));

		assert!(coordinator.ensure_valid(SessionCheckRequest::new()).await.is_valid());

		clock.advance(Duration::seconds(29));

		assert!(coordinator.ensure_valid(SessionCheckRequest::new()).await.is_valid());
		assert_eq!(source.calls.load(Ordering::SeqCst), 1);

		clock.advance(Duration::seconds(1));

		assert!(coordinator.ensure_valid(SessionCheckRequest::new()).await.is_valid());
		assert_eq!(source.calls.load(Ordering::SeqCst), 2);
		assert_eq!(coordinator.last_verified_at(), Some(start + Duration::seconds(30)));
	}

	#[tokio::test]
	async fn invalidate_forces_reverification_without_regressing() {
		let start = macros::datetime!(2025-06-01 12:00 UTC);
		let clock = ManualClock::new(start);
		let source = Arc::new(FixedSource {
			credential: Some(credential(start + Duration::hours(1))),
			calls: AtomicUsize::new(0),
		});
		let coordinator = SessionCoordinator::new(source.clone(), Arc::new(clock.clone()));

		coordinator.ensure_valid(SessionCheckRequest::new()).await;
		coordinator.invalidate();

		assert_eq!(coordinator.last_verified_at(), Some(start));

		coordinator.ensure_valid(SessionCheckRequest::new()).await;

		assert_eq!(source.calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn expired_current_credential_is_unavailable() {
		let start = macros::datetime!(2025-06-01 12:00 UTC);
		let source = Arc::new(FixedSource {
			credential: Some(credential(start - Duration::minutes(1))),
			calls: AtomicUsize::new(0),
		});
		let coordinator = SessionCoordinator::new(source, Arc::new(ManualClock::new(start)));
		let outcome = coordinator.ensure_valid(SessionCheckRequest::new()).await;

		assert_eq!(
			outcome,
			SessionValidity::Unavailable(UnavailableCause::Failed {
				stage: VerificationStage::Refresh,
				message: "refresh disabled".into(),
			})
		);
		assert_eq!(coordinator.last_verified_at(), None);
		assert!(matches!(outcome.into_result(), Err(Error::Unavailable)));
	}
}
