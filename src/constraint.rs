//! # Sleep-Mode Constraint Registry
//!
//! A reference-counted vote table. Any driver or subsystem may hold a
//! constraint on a mode, meaning "do not sleep deeper than this". The
//! resolved mode is the shallowest mode with at least one vote.
//!
//! ```text
//!   mode     None Idle Light Deep Standby Shutdown
//!   votes      0    0    1    2      0       0
//!                        ▲
//!                        └── resolved: Light
//! ```
//!
//! The table itself is plain data; the manager keeps it behind an
//! interrupt-masked critical section because votes arrive from both task
//! and interrupt context.

use crate::mode::{SleepMode, MODE_COUNT};

/// Per-mode saturating vote counters plus the resolved mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintTable {
    counts: [u8; MODE_COUNT],
    current: SleepMode,
}

impl ConstraintTable {
    /// An empty table. The resolved mode starts at `initial` and stays there
    /// until the first vote.
    pub const fn new(initial: SleepMode) -> Self {
        Self {
            counts: [0; MODE_COUNT],
            current: initial,
        }
    }

    /// Add a vote for `mode` (saturating at 255) and re-resolve.
    pub fn request(&mut self, mode: SleepMode) -> SleepMode {
        let count = &mut self.counts[mode.index()];
        *count = count.saturating_add(1);
        self.resolve()
    }

    /// Drop a vote for `mode` (floored at zero) and re-resolve.
    pub fn release(&mut self, mode: SleepMode) -> SleepMode {
        let count = &mut self.counts[mode.index()];
        *count = count.saturating_sub(1);
        self.resolve()
    }

    /// The first mode, shallowest first, with a nonzero counter becomes the
    /// resolved mode. With no votes at all the previous mode is kept.
    pub fn resolve(&mut self) -> SleepMode {
        if let Some(mode) = SleepMode::ALL
            .iter()
            .copied()
            .find(|mode| self.counts[mode.index()] != 0)
        {
            self.current = mode;
        }
        self.current
    }

    #[inline]
    pub fn current(&self) -> SleepMode {
        self.current
    }

    #[inline]
    pub fn count(&self, mode: SleepMode) -> u8 {
        self.counts[mode.index()]
    }

    #[inline]
    pub fn counts(&self) -> [u8; MODE_COUNT] {
        self.counts
    }
}
