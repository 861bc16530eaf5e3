//! Optional observability helpers for coordinator operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `credential_coordinator.op` with the `op`
//!   and `stage` fields, plus warnings for swallowed best-effort failures.
//! - Enable `metrics` to increment the `credential_coordinator_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operation kinds observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Session validity check.
	SessionCheck,
	/// Authorization code exchange.
	CodeExchange,
	/// Snapshot cache read-through.
	SnapshotFetch,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::SessionCheck => "session_check",
			OpKind::CodeExchange => "code_exchange",
			OpKind::SnapshotFetch => "snapshot_fetch",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an operation.
	Attempt,
	/// Served from a cache without touching the upstream.
	Cached,
	/// Successful completion.
	Success,
	/// Failure (or unavailable result) returned to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Cached => "cached",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
