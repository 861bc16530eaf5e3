// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for authorization code exchanges.
#[derive(Debug, Default)]
pub struct ExchangeMetrics {
	attempts: AtomicU64,
	cache_hits: AtomicU64,
	provider_calls: AtomicU64,
	recovered: AtomicU64,
	failures: AtomicU64,
}
impl ExchangeMetrics {
	/// Total number of `exchange` calls.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Calls answered from the durable store.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	/// Calls that reached the provider's code-exchange endpoint.
	pub fn provider_calls(&self) -> u64 {
		self.provider_calls.load(Ordering::Relaxed)
	}

	/// Provider rejections recovered by re-reading a concurrent winner's record.
	pub fn recovered(&self) -> u64 {
		self.recovered.load(Ordering::Relaxed)
	}

	/// Calls that returned an error.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_provider_call(&self) {
		self.provider_calls.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_recovered(&self) {
		self.recovered.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
