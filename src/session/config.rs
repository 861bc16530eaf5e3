//! Tunables for the session coordinator and the per-call request options.

// self
use crate::{_prelude::*, clock::non_negative};

/// Timing configuration for [`SessionCoordinator`](crate::session::SessionCoordinator).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
	/// Maximum age of a successful verification that is trusted without re-checking.
	pub ttl: Duration,
	/// Deadline for each credential fetch.
	pub fetch_timeout: Duration,
	/// Deadline for each refresh call.
	pub refresh_timeout: Duration,
	/// Budget for a whole verification; every step is capped at what remains of it.
	pub check_timeout: Duration,
	/// Remaining lifetime under which a credential is proactively refreshed.
	pub low_water_mark: Duration,
}
impl SessionConfig {
	const DEFAULT_CHECK_TIMEOUT: Duration = Duration::seconds(20);
	const DEFAULT_FETCH_TIMEOUT: Duration = Duration::seconds(8);
	const DEFAULT_LOW_WATER_MARK: Duration = Duration::seconds(60);
	const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::seconds(10);
	const DEFAULT_TTL: Duration = Duration::seconds(30);

	/// Overrides the verification TTL (defaults to 30 seconds).
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = non_negative(ttl);

		self
	}

	/// Overrides the fetch deadline (defaults to 8 seconds).
	pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
		self.fetch_timeout = non_negative(timeout);

		self
	}

	/// Overrides the refresh deadline (defaults to 10 seconds).
	pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
		self.refresh_timeout = non_negative(timeout);

		self
	}

	/// Overrides the whole-verification budget (defaults to 20 seconds).
	pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
		self.check_timeout = non_negative(timeout);

		self
	}

	/// Overrides the proactive refresh window (defaults to 60 seconds).
	pub fn with_low_water_mark(mut self, window: Duration) -> Self {
		self.low_water_mark = non_negative(window);

		self
	}
}
impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			ttl: Self::DEFAULT_TTL,
			fetch_timeout: Self::DEFAULT_FETCH_TIMEOUT,
			refresh_timeout: Self::DEFAULT_REFRESH_TIMEOUT,
			check_timeout: Self::DEFAULT_CHECK_TIMEOUT,
			low_water_mark: Self::DEFAULT_LOW_WATER_MARK,
		}
	}
}

/// Per-call options for [`SessionCoordinator::ensure_valid`](crate::session::SessionCoordinator::ensure_valid).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionCheckRequest {
	/// Skips the TTL short-circuit. Still joins an in-flight verification.
	pub force: bool,
	/// Budget for a verification started by this call; `None` uses
	/// [`SessionConfig::check_timeout`].
	pub deadline: Option<Duration>,
}
impl SessionCheckRequest {
	/// Creates a request that honors the TTL cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Forces re-verification past the TTL cache.
	pub fn force_refresh(mut self) -> Self {
		self.force = true;

		self
	}

	/// Overrides the force flag.
	pub fn with_force(mut self, force: bool) -> Self {
		self.force = force;

		self
	}

	/// Bounds the whole verification started by this call, refreshes included.
	pub fn with_deadline(mut self, deadline: Duration) -> Self {
		self.deadline = Some(non_negative(deadline));

		self
	}
}
