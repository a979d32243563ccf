//! Cooperative interrupt probes.
//!
//! When a native poll is interrupted by a signal, the bridge asks the host
//! whether a real interrupt (for example a user pressing Ctrl-C in an
//! interpreter) is pending. If so the poll unwinds with
//! [`BridgeError::Interrupted`](crate::error::BridgeError::Interrupted);
//! otherwise the signal was unrelated and the poll is retried.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Host-provided check for a pending interrupt.
pub trait InterruptProbe {
    /// True if the host has an interrupt waiting to be delivered.
    fn interrupt_pending(&self) -> bool;
}

impl<F> InterruptProbe for F
where
    F: Fn() -> bool,
{
    fn interrupt_pending(&self) -> bool {
        self()
    }
}

/// Probe for hosts without interrupt delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverInterrupted;

impl InterruptProbe for NeverInterrupted {
    fn interrupt_pending(&self) -> bool {
        false
    }
}

/// Shared flag a signal handler or another thread can raise.
///
/// Probing consumes the interrupt, so one raised flag unwinds one poll.
#[derive(Clone, Default)]
pub struct InterruptFlag {
    raised: Arc<AtomicBool>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an interrupt as pending.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }
}

impl InterruptProbe for InterruptFlag {
    fn interrupt_pending(&self) -> bool {
        self.raised.swap(false, Ordering::SeqCst)
    }
}

impl fmt::Debug for InterruptFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptFlag")
            .field("raised", &self.is_raised())
            .finish()
    }
}
