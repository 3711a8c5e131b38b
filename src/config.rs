//! # Low-Power Manager Configuration
//!
//! Compile-time constants governing sleep arbitration and the low-power
//! clock. All limits are fixed at compile time; nothing is allocated at run time.

use crate::mode::SleepMode;

/// Kernel tick frequency in Hz. The tick↔nanosecond conversion factors
/// are derived from this value when the manager is initialised.
pub const TICK_HZ: u32 = 1000;

/// Nanoseconds per second.
pub const NSEC_PER_SEC: u32 = 1_000_000_000;

/// Minimum idle window, in milliseconds, worth entering a real low-power
/// mode for. Shorter windows abort the idle cycle as busy.
pub const MIN_SLEEP_MS: u64 = 2;

/// Guard period the low-power clock is re-armed with after every interrupt
/// taken during a sleep episode. Bounds the time spent half-awake before
/// the idle task resumes the drivers.
pub const GUARD_NSEC: u64 = 1_000_000;

/// Mode used for the cheap probe suspend that lets drivers veto sleep
/// before the clock is reprogrammed.
pub const PROBE_MODE: SleepMode = SleepMode::Light;

/// Capacity of the peripheral suspend/resume chain.
pub const MAX_DEVICES: usize = 16;

/// Capacity of the sleep-time update list, the kernel tick consumer included.
pub const MAX_UPDATE_CALLBACKS: usize = 4;

/// One-shot interval armed while discovering the low-power clock's IRQ.
pub const LPCE_PROBE_NSEC: u64 = 10;

/// Spin iterations to wait for the probe interrupt before giving up.
pub const LPCE_PROBE_SPINS: u32 = 1_000_000;

/// Core clock frequency in Hz (STM32F4 HSI at reset). Drives the SysTick
/// clock event on the Cortex-M4 port.
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
