//! The process-wide frame counter.

use pioe_abi::Frame;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic frame counter advanced by the scheduler.
///
/// Only [`reset`](Self::reset) moves the counter backwards, and only before
/// the scheduler starts.
#[derive(Debug, Default)]
pub struct FrameClock {
    current: AtomicU64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the current frame.
    pub fn current(&self) -> Frame {
        Frame::new(self.current.load(Ordering::Acquire))
    }

    /// Advance by exactly one frame and return the new frame.
    pub fn advance(&self) -> Frame {
        Frame::new(self.current.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub(crate) fn reset(&self) {
        self.current.store(0, Ordering::Release);
    }
}
