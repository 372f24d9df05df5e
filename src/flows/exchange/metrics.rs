// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh exchanges and cache reuse.
#[derive(Debug, Default)]
pub struct ExchangeMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	cache_hits: AtomicU64,
}
impl ExchangeMetrics {
	/// Returns the number of exchanges sent to the token endpoint.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of exchanges that produced a usable token set.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of failed exchanges.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of accessor calls answered from the cache.
	pub fn cache_hits(&self) -> u64 {
		self.cache_hits.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_success(&self) {
		self.success.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failure.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_cache_hit(&self) {
		self.cache_hits.fetch_add(1, Ordering::Relaxed);
	}
}
