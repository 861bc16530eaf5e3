//! Wall-clock and timer abstraction so TTL, expiry, and deadline logic can be driven
//! deterministically in tests.

// std
use std::task::{Context, Poll, Waker};
// self
use crate::_prelude::*;

/// Boxed timer future returned by [`Clock::sleep`].
pub type ClockFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Source of the current instant and of timers that complete after a duration.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current UTC instant.
	fn now(&self) -> OffsetDateTime;

	/// Returns a future that resolves once `duration` has elapsed on this clock.
	///
	/// Non-positive durations resolve immediately.
	fn sleep(&self, duration: Duration) -> ClockFuture;
}

/// Clamps negative durations to zero.
pub(crate) fn non_negative(duration: Duration) -> Duration {
	if duration.is_negative() { Duration::ZERO } else { duration }
}

/// Production clock backed by the system time and Tokio timers.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}

	fn sleep(&self, duration: Duration) -> ClockFuture {
		let duration = std::time::Duration::try_from(duration).unwrap_or_default();

		Box::pin(tokio::time::sleep(duration))
	}
}

/// Manually driven clock; time only moves when [`ManualClock::advance`] or
/// [`ManualClock::set`] is called, waking every sleeper whose deadline has passed.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<ManualState>>);
impl ManualClock {
	/// Creates a clock frozen at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(ManualState { now: start, sleepers: Vec::new() })))
	}

	/// Moves the clock forward by `by`.
	pub fn advance(&self, by: Duration) {
		let wakers = {
			let mut state = self.0.lock();

			state.now += by;

			std::mem::take(&mut state.sleepers)
		};

		wakers.into_iter().for_each(Waker::wake);
	}

	/// Jumps the clock to `instant`.
	pub fn set(&self, instant: OffsetDateTime) {
		let wakers = {
			let mut state = self.0.lock();

			state.now = instant;

			std::mem::take(&mut state.sleepers)
		};

		wakers.into_iter().for_each(Waker::wake);
	}
}
impl Default for ManualClock {
	fn default() -> Self {
		Self::new(OffsetDateTime::UNIX_EPOCH)
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		self.0.lock().now
	}

	fn sleep(&self, duration: Duration) -> ClockFuture {
		let state = self.0.clone();
		let wake_at = state.lock().now + duration;

		Box::pin(ManualSleep { state, wake_at })
	}
}

#[derive(Debug)]
struct ManualState {
	now: OffsetDateTime,
	sleepers: Vec<Waker>,
}

struct ManualSleep {
	state: Arc<Mutex<ManualState>>,
	wake_at: OffsetDateTime,
}
impl Future for ManualSleep {
	type Output = ();

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		let mut state = self.state.lock();

		if state.now >= self.wake_at {
			return Poll::Ready(());
		}

		if !state.sleepers.iter().any(|w| w.will_wake(cx.waker())) {
			state.sleepers.push(cx.waker().clone());
		}

		Poll::Pending
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[tokio::test]
	async fn manual_sleep_completes_only_after_advance() {
		let clock = ManualClock::new(macros::datetime!(2025-06-01 12:00 UTC));
		let sleeper = tokio::spawn(clock.sleep(Duration::seconds(10)));

		tokio::task::yield_now().await;
		clock.advance(Duration::seconds(5));
		tokio::task::yield_now().await;

		assert!(!sleeper.is_finished(), "Sleeper must not fire before its deadline.");

		clock.advance(Duration::seconds(5));
		sleeper.await.expect("Sleeper task should complete once the deadline passes.");

		assert_eq!(clock.now(), macros::datetime!(2025-06-01 12:00:10 UTC));
	}

	#[test]
	fn repeated_polls_register_one_waker() {
		let clock = ManualClock::default();
		let mut sleep = clock.sleep(Duration::seconds(1));
		let mut cx = Context::from_waker(futures::task::noop_waker_ref());

		for _ in 0..5 {
			assert!(sleep.as_mut().poll(&mut cx).is_pending());
		}

		assert_eq!(clock.0.lock().sleepers.len(), 1);

		clock.advance(Duration::seconds(1));

		assert!(clock.0.lock().sleepers.is_empty());
		assert!(sleep.as_mut().poll(&mut cx).is_ready());
	}

	#[tokio::test]
	async fn non_positive_sleep_is_immediate() {
		let clock = ManualClock::default();

		clock.sleep(Duration::ZERO).await;
		clock.sleep(Duration::seconds(-3)).await;
		SystemClock.sleep(Duration::seconds(-1)).await;
	}
}
