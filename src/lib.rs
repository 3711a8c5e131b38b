//! # EqOS Low-Power Manager
//!
//! Tickless sleep for the EqOS kernel on ARM Cortex-M4. The manager decides
//! how deeply the idle CPU may sleep and lets peripheral drivers veto it.
//! A low-power timer bounds each sleep, and the slept time is credited back
//! to the kernel tick counter on wake.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │        Idle Task · Interrupt Entry · Debug Shell        │
//! ├────────────────────────────────────────────────────────┤
//! │               Low-Power Manager (manager.rs)            │
//! │   init() · run_idle_cycle() · irq_entry() · request()  │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │ Constraints  │   Device Chain     │  Unit Converter   │
//! │ constraint.rs│   device.rs        │  convert.rs       │
//! │ ─ request()  │   ─ suspend_all()  │  ─ ticks→nsec     │
//! │ ─ release()  │   ─ resume_all()   │  ─ nsec→ticks     │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │   Platform traits (platform.rs) · Sync (sync.rs)        │
//! │   Kernel · ClockEvent · SleepPrimitive · LowPowerDevice │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │        SysTick clock event · WFI / SLEEPDEEP            │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Arbitration
//!
//! Drivers vote with [`LowPowerManager::request_mode`] and
//! [`LowPowerManager::release_mode`]. The shallowest mode holding a vote
//! wins. The idle task then calls [`LowPowerManager::run_idle_cycle`], which
//! only sleeps when the winning mode is deeper than `Idle`.
//!
//! ## Reconciliation
//!
//! Every interrupt entry calls [`LowPowerManager::irq_entry`]. The first
//! interrupt of a sleep episode works out how long the CPU actually slept:
//! the full armed interval if the low-power timer fired, otherwise the
//! timer's elapsed count. That figure goes to the kernel tick counter first
//! and then to any other registered consumers.
//!
//! ## Memory Model
//!
//! - **No heap**: chains and tables are `heapless` with fixed capacity
//! - **`'static` registrations**: the manager holds references, drivers own state
//! - **Critical sections**: `critical_section::Mutex` for all shared state

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod constraint;
pub mod convert;
pub mod device;
pub mod error;
pub mod manager;
pub mod mode;
pub mod platform;
pub mod shell;
pub mod sync;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod arch;

pub use error::{LpmError, LpmResult};
pub use manager::{LowPowerManager, SleepPhase, SleepStats};
pub use mode::SleepMode;
pub use platform::{
    ClockEvent, ClockEventHandler, Kernel, LowPowerDevice, SleepEvent, SleepNotify,
    SleepPrimitive, SleepTimeUpdate, Tick,
};
