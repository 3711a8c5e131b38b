//! Error type for low-power manager operations.

use core::fmt;

/// Low-power manager errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LpmError {
    /// A driver vetoed suspend, or the idle window is too short to be worth
    /// a low-power mode. Expected and frequent; the system is left running.
    Busy,
    /// The manager has not been bound to a low-power clock yet.
    NotInitialized,
    /// `init` was called a second time.
    AlreadyInitialized,
    /// The suspend/resume chain has no free slot.
    DeviceTableFull,
    /// The sleep-time update list has no free slot.
    CallbackTableFull,
    /// The low-power clock never raised its probe interrupt.
    ClockIrqNotFound,
    /// The low-power clock uses a prescaler, which the manager cannot drive.
    UnsupportedClock,
}

impl fmt::Display for LpmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LpmError::Busy => f.write_str("busy: sleep vetoed or idle window too short"),
            LpmError::NotInitialized => f.write_str("low-power manager not initialised"),
            LpmError::AlreadyInitialized => f.write_str("low-power manager already initialised"),
            LpmError::DeviceTableFull => f.write_str("device table full"),
            LpmError::CallbackTableFull => f.write_str("update callback table full"),
            LpmError::ClockIrqNotFound => f.write_str("low-power clock irq not found"),
            LpmError::UnsupportedClock => f.write_str("low-power clock must not use a prescaler"),
        }
    }
}

/// Result type for low-power manager operations.
pub type LpmResult<T> = Result<T, LpmError>;
