// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for resolution attempts.
#[derive(Debug, Default)]
pub struct ResolveMetrics {
	attempts: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	retries: AtomicU64,
	builds: AtomicU64,
	refreshes: AtomicU64,
}
impl ResolveMetrics {
	/// Returns the total number of resolution attempts.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of resolutions that completed successfully (including cache reuses).
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of resolutions that failed.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of invalidate-and-retry cycles triggered by auth failures.
	pub fn retries(&self) -> u64 {
		self.retries.load(Ordering::Relaxed)
	}

	/// Returns the number of service handles constructed on cache misses.
	pub fn builds(&self) -> u64 {
		self.builds.load(Ordering::Relaxed)
	}

	/// Returns the number of token refresh exchanges performed.
	pub fn refreshes(&self) -> u64 {
		self.refreshes.load(Ordering::Relaxed)
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

	pub(crate) fn record_retry(&self) {
		self.retries.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_build(&self) {
		self.builds.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_refresh(&self) {
		self.refreshes.fetch_add(1, Ordering::Relaxed);
	}
}
