// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for session validity checks.
#[derive(Debug, Default)]
pub struct SessionMetrics {
	checks: AtomicU64,
	cache_hits: AtomicU64,
	joined: AtomicU64,
	verifications: AtomicU64,
	refresh_attempts: AtomicU64,
	unavailable: AtomicU64,
}
impl SessionMetrics {
	/// Total number of `ensure_valid` calls.
	pub fn checks(&self) -> u64 {
		self.checks.load(Ordering::Relaxed)
	}

	/// Calls answered from the TTL cache without contacting the credential service.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Calls that awaited a verification another caller had already started.
	pub fn joined(&self) -> u64 {
		self.joined.load(Ordering::Relaxed)
	}

	/// Underlying verification sequences actually executed.
	pub fn verifications(&self) -> u64 {
		self.verifications.load(Ordering::Relaxed)
	}

	/// Silent and proactive refresh calls issued to the credential service.
	pub fn refresh_attempts(&self) -> u64 {
		self.refresh_attempts.load(Ordering::Relaxed)
	}

	/// Verifications that ended without a credential.
	pub fn unavailable(&self) -> u64 {
		self.unavailable.load(Ordering::Relaxed)
	}

	pub(crate) fn record_check(&self) {
		self.checks.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_join(&self) {
		self.joined.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_verification(&self) {
		self.verifications.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh_attempt(&self) {
		self.refresh_attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_unavailable(&self) {
		self.unavailable.fetch_add(1, Ordering::Relaxed);
	}
}
