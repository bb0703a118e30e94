//! Bounded waiting for the retransmission loop.
//!
//! The sender never blocks indefinitely: every wait for an acknowledgment is
//! wrapped in [`bounded_wait`], which reports a timeout as an ordinary value
//! ([`WaitOutcome::TimedOut`]) instead of an error.  The retry loop then
//! matches on both outcomes side by side.

use std::future::Future;
use std::time::Duration;

/// Result of a wait that may have run out of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome<T> {
    /// The awaited future completed within the limit.
    Ready(T),
    /// The limit elapsed first; the future was dropped.
    TimedOut,
}

impl<T> WaitOutcome<T> {
    pub fn is_timed_out(&self) -> bool {
        matches!(self, WaitOutcome::TimedOut)
    }
}

/// Await `fut` for at most `limit`.
pub async fn bounded_wait<F>(limit: Duration, fut: F) -> WaitOutcome<F::Output>
where
    F: Future,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(value) => WaitOutcome::Ready(value),
        Err(_elapsed) => WaitOutcome::TimedOut,
    }
}

/// Upper bound on how long one packet can take before the sender gives up:
/// the first send plus `max_retries` resends, each waiting `timeout`.
pub fn worst_case_per_packet(timeout: Duration, max_retries: u32) -> Duration {
    timeout.saturating_mul(max_retries.saturating_add(1))
}
