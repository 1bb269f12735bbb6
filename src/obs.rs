//! Optional observability helpers for resolution stages.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `service_broker.stage` with the `stage`
//!   (resolve/refresh/build) and `site` (call site) fields.
//! - Enable `metrics` to increment the `service_broker_stage_total` counter for every
//!   attempt/success/failure/retry, labeled by `stage` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Resolution stages observed by the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
	/// End-to-end handle resolution including the wrapped operation.
	Resolve,
	/// Refresh token exchange against the token endpoint.
	Refresh,
	/// Service handle construction on a cache miss.
	Build,
}
impl StageKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageKind::Resolve => "resolve",
			StageKind::Refresh => "refresh",
			StageKind::Build => "build",
		}
	}
}
impl Display for StageKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageOutcome {
	/// Entry to a resolver stage.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Cache invalidation followed by a second attempt.
	Retry,
}
impl StageOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			StageOutcome::Attempt => "attempt",
			StageOutcome::Success => "success",
			StageOutcome::Failure => "failure",
			StageOutcome::Retry => "retry",
		}
	}
}
impl Display for StageOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
