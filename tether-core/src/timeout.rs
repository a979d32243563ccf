//! Timeout budgets for blocking native calls.
//!
//! A native poll can return early because an unrelated signal interrupted
//! it. Retrying with the original timeout would let repeated interruptions
//! stretch a 5 second poll indefinitely, so retries draw from a
//! [`Budget`] that is measured against the start of the whole call.

use std::time::{Duration, Instant};

/// Poll timeout as given by the host.
///
/// - `Infinite`: block until an event arrives
/// - `After(Duration::ZERO)`: check readiness and return immediately
/// - `After(duration)`: wait up to duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTimeout {
    Infinite,
    After(Duration),
}

impl PollTimeout {
    /// Interpret a libzmq-style millisecond timeout; negative means infinite.
    pub fn from_millis(timeout_ms: i64) -> Self {
        if timeout_ms < 0 {
            Self::Infinite
        } else {
            Self::After(Duration::from_millis(timeout_ms.unsigned_abs()))
        }
    }

    pub fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }
}

/// Remaining wait time for one blocking call, across retries.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    timeout: PollTimeout,
    started: Instant,
}

impl Budget {
    /// Start the clock now.
    pub fn start(timeout: PollTimeout) -> Self {
        Self::started_at(timeout, Instant::now())
    }

    pub fn started_at(timeout: PollTimeout, started: Instant) -> Self {
        Self { timeout, started }
    }

    pub fn timeout(&self) -> PollTimeout {
        self.timeout
    }

    /// Time left, `None` for an infinite budget.
    pub fn remaining(&self) -> Option<Duration> {
        self.remaining_at(Instant::now())
    }

    pub fn remaining_at(&self, now: Instant) -> Option<Duration> {
        match self.timeout {
            PollTimeout::Infinite => None,
            PollTimeout::After(total) => {
                Some(total.saturating_sub(now.saturating_duration_since(self.started)))
            }
        }
    }

    /// True once a finite budget has no time left.
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Some(Duration::ZERO)
    }

    /// Remaining time in native milliseconds (`-1` for infinite).
    ///
    /// Rounds up so a sub-millisecond remainder still waits instead of
    /// turning into a non-blocking check.
    pub fn native_millis(&self) -> i64 {
        match self.remaining() {
            None => -1,
            Some(left) => {
                let mut ms = left.as_millis();
                if left.subsec_nanos() % 1_000_000 != 0 {
                    ms += 1;
                }
                i64::try_from(ms).unwrap_or(i64::MAX)
            }
        }
    }
}
