//! # Sleep Modes
//!
//! The ordered set of power states the manager arbitrates between.
//!
//! ```text
//!   shallow / high power                          deep / low power
//!   None ─► Idle ─► Light ─► Deep ─► Standby ─► Shutdown
//! ```
//!
//! Ordinal order is load-bearing: arbitration always picks the shallowest
//! mode that still has an active constraint.

use core::fmt;
use core::str::FromStr;

/// Number of sleep modes, i.e. the size of the constraint table.
pub const MODE_COUNT: usize = 6;

/// A power state, from full-run (`None`) to the deepest (`Shutdown`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SleepMode {
    /// No sleep at all; the CPU keeps running.
    None = 0,
    /// CPU clock gated, everything else running.
    Idle = 1,
    /// Light sleep. Also the mode of the probe suspend.
    Light = 2,
    /// Deep sleep; most peripheral clocks stopped.
    Deep = 3,
    /// Standby; only the wake-up domain is powered.
    Standby = 4,
    /// Shutdown.
    Shutdown = 5,
}

impl SleepMode {
    /// Every mode, shallowest first.
    pub const ALL: [SleepMode; MODE_COUNT] = [
        SleepMode::None,
        SleepMode::Idle,
        SleepMode::Light,
        SleepMode::Deep,
        SleepMode::Standby,
        SleepMode::Shutdown,
    ];

    /// Index of this mode in the constraint table.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Mode at `index`, or `None` past the deepest mode.
    pub const fn from_index(index: usize) -> Option<Self> {
        if index < MODE_COUNT {
            Some(Self::ALL[index])
        } else {
            None
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SleepMode::None => "None",
            SleepMode::Idle => "Idle",
            SleepMode::Light => "Light",
            SleepMode::Deep => "Deep",
            SleepMode::Standby => "Standby",
            SleepMode::Shutdown => "Shutdown",
        }
    }
}

impl fmt::Display for SleepMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a string names no sleep mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownMode;

impl fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown sleep mode")
    }
}

/// Parses either a table index (`"3"`) or a case-insensitive name (`"deep"`).
impl FromStr for SleepMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(index) = s.parse::<usize>() {
            return SleepMode::from_index(index).ok_or(UnknownMode);
        }
        SleepMode::ALL
            .iter()
            .copied()
            .find(|mode| mode.name().eq_ignore_ascii_case(s))
            .ok_or(UnknownMode)
    }
}
