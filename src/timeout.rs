//! Deadline wrapper that races an operation against a [`Clock`] timer.

// crates.io
use futures::future::{self, Either};
// self
use crate::{_prelude::*, clock::Clock};

/// Returned when a bounded operation does not finish before its deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ThisError)]
#[error("Operation `{operation}` did not complete within {after}.")]
pub struct Elapsed {
	/// Stable label of the operation that timed out.
	pub operation: &'static str,
	/// Deadline that was exceeded.
	pub after: Duration,
}

/// Runs `operation` until it completes or `deadline` elapses on `clock`.
///
/// The operation is dropped on timeout. A result that becomes ready on the same poll as the
/// timer wins over the timer.
pub async fn with_deadline<F>(
	clock: &dyn Clock,
	label: &'static str,
	deadline: Duration,
	operation: F,
) -> Result<F::Output, Elapsed>
where
	F: Future,
{
	let timer = clock.sleep(deadline);
	let operation = std::pin::pin!(operation);

	match future::select(operation, timer).await {
		Either::Left((output, _)) => Ok(output),
		Either::Right(((), _)) => Err(Elapsed { operation: label, after: deadline }),
	}
}
