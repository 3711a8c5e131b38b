//! # Cortex-M4 Port Layer
//!
//! Hardware-specific pieces for the ARM Cortex-M4 (Thumb-2) processor:
//! a one-shot clock event on the SysTick timer and the WFI sleep routine.
//!
//! ## SysTick as a Clock Event
//!
//! SysTick is a 24-bit down-counter clocked from the core clock. It is
//! armed by loading the interval into the reload register and clearing the
//! current value. It auto-reloads, so the exception handler stops it unless
//! it was re-armed while the interrupt was being taken.
//!
//! ```text
//!   RVR ─► CVR counts down ─► 0: COUNTFLAG=1, SysTick pending ─► reload
//! ```
//!
//! SysTick stops in the deep-sleep modes on most parts; a board that needs
//! real Deep/Standby residency supplies an LPTIM-backed [`ClockEvent`]
//! instead.
//!
//! ## Sleep
//!
//! `Idle` and `Light` are plain WFI. `Deep` and beyond set
//! `SCB.SCR.SLEEPDEEP` around the WFI.

use core::cell::Cell;

use cortex_m::peripheral::{SCB, SYST};
use critical_section::Mutex;

use crate::config::{NSEC_PER_SEC, SYSTEM_CLOCK_HZ};
use crate::error::LpmResult;
use crate::mode::SleepMode;
use crate::platform::{ClockEvent, ClockEventHandler, SleepPrimitive};

/// Exception number SysTick expiries are delivered on.
pub const SYSTICK_IRQ: u32 = 15;

const SYST_MASK: u32 = 0x00FF_FFFF;

// SYST_CSR bits
const CSR_ENABLE: u32 = 1 << 0;
const CSR_TICKINT: u32 = 1 << 1;
const CSR_CLKSOURCE: u32 = 1 << 2;
const CSR_COUNTFLAG: u32 = 1 << 16;

// System Control Register: 0xE000_ED10, SLEEPDEEP = bit 2
const SCR: *mut u32 = 0xE000_ED10 as *mut u32;
const SCR_SLEEPDEEP: u32 = 1 << 2;

#[inline]
fn syst() -> &'static cortex_m::peripheral::syst::RegisterBlock {
    // SAFETY: fixed MMIO address; every write goes through a critical section.
    unsafe { &*SYST::PTR }
}

#[inline]
const fn cycles_to_nsec(cycles: u64) -> u64 {
    cycles * NSEC_PER_SEC as u64 / SYSTEM_CLOCK_HZ as u64
}

// ---------------------------------------------------------------------------
// SysTick clock event
// ---------------------------------------------------------------------------

/// One-shot clock event on the core SysTick timer.
pub struct SysTickClockEvent {
    handler: Mutex<Cell<Option<&'static dyn ClockEventHandler>>>,
    /// Reload value of the pending one-shot, zero when stopped.
    armed: Mutex<Cell<u32>>,
}

impl SysTickClockEvent {
    pub const fn new() -> Self {
        Self {
            handler: Mutex::new(Cell::new(None)),
            armed: Mutex::new(Cell::new(0)),
        }
    }

    /// Body of the `SysTick` exception handler. Call it after
    /// [`crate::LowPowerManager::irq_entry`].
    pub fn on_interrupt(&self) {
        let handler = critical_section::with(|cs| {
            // Reading CSR clears COUNTFLAG; a re-arm inside irq_entry wrote
            // CVR, which already cleared it.
            if syst().csr.read() & CSR_COUNTFLAG != 0 {
                // SAFETY: disabling the counter has no other side effect.
                unsafe { syst().csr.write(0) };
                self.armed.borrow(cs).set(0);
            }
            self.handler.borrow(cs).get()
        });

        if let Some(handler) = handler {
            handler.on_event(SYSTICK_IRQ);
        }
    }
}

impl Default for SysTickClockEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockEvent for SysTickClockEvent {
    fn name(&self) -> &str {
        "systick"
    }

    fn min_nsec(&self) -> u64 {
        // A couple of hundred cycles covers the exception entry.
        cycles_to_nsec(256)
    }

    fn max_nsec(&self) -> u64 {
        cycles_to_nsec(SYST_MASK as u64)
    }

    fn mask(&self) -> u64 {
        SYST_MASK as u64
    }

    fn freq(&self) -> u32 {
        SYSTEM_CLOCK_HZ
    }

    fn prescaler_mask(&self) -> u32 {
        1
    }

    fn start_oneshot(&self, nsec: u64) {
        let cycles = nsec * SYSTEM_CLOCK_HZ as u64 / NSEC_PER_SEC as u64;
        let reload = cycles.clamp(1, SYST_MASK as u64) as u32;

        critical_section::with(|cs| {
            let syst = syst();
            // SAFETY: SysTick is owned by this clock event.
            unsafe {
                syst.csr.write(0);
                syst.rvr.write(reload);
                syst.cvr.write(0);
                syst.csr.write(CSR_ENABLE | CSR_TICKINT | CSR_CLKSOURCE);
            }
            self.armed.borrow(cs).set(reload);
        });
    }

    fn stop(&self) {
        critical_section::with(|cs| {
            // SAFETY: SysTick is owned by this clock event.
            unsafe { syst().csr.write(0) };
            SCB::clear_pendst();
            self.armed.borrow(cs).set(0);
        });
    }

    fn read(&self) -> u64 {
        let elapsed = critical_section::with(|cs| {
            let armed = self.armed.borrow(cs).get();
            if armed == 0 {
                0
            } else {
                armed.saturating_sub(SYST::get_current())
            }
        });
        cycles_to_nsec(elapsed as u64)
    }

    fn set_event_handler(&self, handler: Option<&'static dyn ClockEventHandler>) {
        critical_section::with(|cs| self.handler.borrow(cs).set(handler));
    }
}

// ---------------------------------------------------------------------------
// WFI sleep
// ---------------------------------------------------------------------------

/// Sleep routine built on WFI and the SLEEPDEEP bit.
pub struct WfiSleep;

impl SleepPrimitive for WfiSleep {
    fn sleep(&self, mode: SleepMode) -> LpmResult<()> {
        let deep = match mode {
            SleepMode::None => return Ok(()),
            SleepMode::Idle | SleepMode::Light => false,
            SleepMode::Deep | SleepMode::Standby | SleepMode::Shutdown => true,
        };

        // SAFETY: SCR is a core register; only SLEEPDEEP is touched.
        unsafe {
            let val = core::ptr::read_volatile(SCR);
            let val = if deep {
                val | SCR_SLEEPDEEP
            } else {
                val & !SCR_SLEEPDEEP
            };
            core::ptr::write_volatile(SCR, val);
        }

        cortex_m::asm::dsb();
        cortex_m::asm::wfi();

        if deep {
            // SAFETY: as above.
            unsafe {
                let val = core::ptr::read_volatile(SCR);
                core::ptr::write_volatile(SCR, val & !SCR_SLEEPDEEP);
            }
        }
        Ok(())
    }
}
