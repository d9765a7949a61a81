//! One-way notification handles crossing execution contexts.
//!
//! Both handles are cheap `Arc`'d atomics: an interrupt (or simulated
//! interrupt) context raises them, the control-loop context observes them.
//! No lock is ever held, so raising from an ISR-like context is always
//! bounded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Latch raised by the index-pin edge interrupt.
///
/// Delivery contract: at most one `raise` per `IndexPin::subscribe` arm.
/// The estimator consumes the latch with `take` at the start of a control
/// tick and applies the count zeroing on the control thread, which is the
/// critical-section discipline the count state requires.
#[derive(Debug, Clone, Default)]
pub struct IndexLatch {
    raised: Arc<AtomicBool>,
}

impl IndexLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the latch. Safe from any context.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    /// Consume the latch, returning whether it was raised since the last take.
    pub fn take(&self) -> bool {
        self.raised.swap(false, Ordering::AcqRel)
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }
}

/// Escalation signal from the sensing core to the owning axis supervisor.
///
/// The core only reports; disabling motor output on a raised signal is the
/// supervisor's job. This is a one-way notification, never a callback.
#[derive(Debug, Clone, Default)]
pub struct FaultSignal {
    raised: Arc<AtomicBool>,
}

impl FaultSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.raised.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// Clear the signal; only the owning supervisor should call this.
    pub fn clear(&self) {
        self.raised.store(false, Ordering::Release);
    }
}
