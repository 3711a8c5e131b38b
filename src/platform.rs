//! # Platform Interfaces
//!
//! The collaborators the low-power manager drives but does not implement:
//! the kernel's scheduler and tick counter, the low-power clock event
//! device, the MCU sleep instruction, and the peripheral drivers.
//!
//! Every trait is `Sync` because implementors are reached from interrupt
//! context through references held by a `static` manager.

use crate::error::LpmResult;
use crate::mode::SleepMode;

/// Kernel tick count.
pub type Tick = u32;

/// Services the kernel scheduler provides to the idle path.
pub trait Kernel: Sync {
    /// Disable task preemption.
    fn schedule_lock(&self);

    /// Re-enable task preemption.
    fn schedule_unlock(&self);

    /// Ticks until the next sleeping task or timer is due, or `None` when
    /// nothing is scheduled and the system may sleep indefinitely.
    fn sleep_ticks(&self) -> Option<Tick>;

    /// Advance the tick counter by `ticks` slept and wake whatever expired.
    fn advance_ticks(&self, ticks: Tick);
}

/// A one-shot hardware timer ("clock event") that keeps counting in the
/// low-power modes.
pub trait ClockEvent: Sync {
    fn name(&self) -> &str;

    /// Shortest programmable interval.
    fn min_nsec(&self) -> u64;

    /// Longest programmable interval.
    fn max_nsec(&self) -> u64;

    /// Counter mask, i.e. the largest count the hardware holds.
    fn mask(&self) -> u64;

    /// Counter frequency in Hz.
    fn freq(&self) -> u32;

    /// Usable prescaler bits. `1` means no prescaler.
    fn prescaler_mask(&self) -> u32;

    /// Stop any pending expiry and arm a single expiry `nsec` from now.
    fn start_oneshot(&self, nsec: u64);

    fn stop(&self);

    /// Nanoseconds elapsed since the last `start_oneshot`.
    fn read(&self) -> u64;

    /// Install (or with `None`, remove) the expiry handler.
    fn set_event_handler(&self, handler: Option<&'static dyn ClockEventHandler>);
}

/// Receiver of clock-event expiries.
pub trait ClockEventHandler: Sync {
    /// Called from the timer's interrupt handler; `irq` is the interrupt
    /// number the expiry was delivered on.
    fn on_event(&self, irq: u32);
}

/// The MCU-specific routine that halts the CPU until an interrupt.
pub trait SleepPrimitive: Sync {
    fn sleep(&self, mode: SleepMode) -> LpmResult<()>;
}

/// Suspend/resume operations of a peripheral driver.
pub trait LowPowerDevice: Sync {
    /// Prepare for `mode`. An error vetoes the sleep attempt.
    fn suspend(&self, mode: SleepMode) -> LpmResult<()>;

    /// Undo `suspend`. Must be a no-op on a device that was never suspended.
    fn resume(&self, mode: SleepMode);
}

/// Consumer of elapsed sleep time.
pub trait SleepTimeUpdate: Sync {
    fn on_sleep_elapsed(&self, nsec: u64);
}

/// Sleep entry/exit event passed to the notify hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepEvent {
    EnterSleep,
    ExitSleep,
}

/// Application hook told about every sleep entry and exit.
pub trait SleepNotify: Sync {
    fn notify(&self, event: SleepEvent, mode: SleepMode);
}
