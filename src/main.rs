//! # EqOS Low-Power Demo Firmware
//!
//! Runs the low-power manager on an STM32F4 with SysTick as the low-power
//! clock. A stand-in kernel has one periodic job every 100 ticks, so the
//! idle task sleeps in 100 ms episodes and each wake credits the slept
//! ticks back to the kernel.
//!
//! | Piece | Role |
//! |-------|------|
//! | `DemoKernel` | tick counter, scheduler lock depth, next periodic deadline |
//! | `Led` | driver that vetoes `Deep` while it is blinking |
//! | `SysTick` | interrupt entry hook plus clock event dispatch |
//!
//! ## Expected Behavior
//!
//! 1. `init` probes SysTick, finds exception 15 and derives the conversion
//!    factors for a 1 s range.
//! 2. With a `Deep` constraint held, every idle cycle suspends `Led`, arms
//!    SysTick for the time left in the period and executes WFI with
//!    SLEEPDEEP set.
//! 3. While `Led` is blinking the `Deep` suspend is vetoed, the cycle
//!    returns busy and the loop simply tries again.

#![no_std]
#![no_main]

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use cortex_m_rt::{entry, exception};
use panic_halt as _;

use eqos_lpm::arch::cortex_m4::{SysTickClockEvent, WfiSleep, SYSTICK_IRQ};
use eqos_lpm::{Kernel, LowPowerDevice, LowPowerManager, LpmError, LpmResult, SleepMode, Tick};

const PERIOD_TICKS: Tick = 100;

static LPM: LowPowerManager = LowPowerManager::new();
static LPCE: SysTickClockEvent = SysTickClockEvent::new();
static SLEEP: WfiSleep = WfiSleep;
static KERNEL: DemoKernel = DemoKernel::new();
static LED: Led = Led::new();

// ---------------------------------------------------------------------------
// Stand-in kernel
// ---------------------------------------------------------------------------

struct DemoKernel {
    ticks: AtomicU32,
    lock_depth: AtomicU32,
}

impl DemoKernel {
    const fn new() -> Self {
        Self {
            ticks: AtomicU32::new(0),
            lock_depth: AtomicU32::new(0),
        }
    }
}

impl Kernel for DemoKernel {
    fn schedule_lock(&self) {
        self.lock_depth.fetch_add(1, Ordering::AcqRel);
    }

    fn schedule_unlock(&self) {
        self.lock_depth.fetch_sub(1, Ordering::AcqRel);
    }

    fn sleep_ticks(&self) -> Option<Tick> {
        let now = self.ticks.load(Ordering::Acquire);
        Some(PERIOD_TICKS - now % PERIOD_TICKS)
    }

    fn advance_ticks(&self, ticks: Tick) {
        let now = self.ticks.fetch_add(ticks, Ordering::AcqRel).wrapping_add(ticks);
        // Toggle the blink phase at every period boundary.
        if now % PERIOD_TICKS == 0 {
            LED.blinking.fetch_xor(true, Ordering::AcqRel);
        }
    }
}

// ---------------------------------------------------------------------------
// Demo driver
// ---------------------------------------------------------------------------

struct Led {
    blinking: AtomicBool,
}

impl Led {
    const fn new() -> Self {
        Self {
            blinking: AtomicBool::new(false),
        }
    }
}

impl LowPowerDevice for Led {
    fn suspend(&self, mode: SleepMode) -> LpmResult<()> {
        if mode >= SleepMode::Deep && self.blinking.load(Ordering::Acquire) {
            return Err(LpmError::Busy);
        }
        Ok(())
    }

    fn resume(&self, _mode: SleepMode) {}
}

// ---------------------------------------------------------------------------
// Interrupts
// ---------------------------------------------------------------------------

#[exception]
fn SysTick() {
    LPM.irq_entry(SYSTICK_IRQ);
    LPCE.on_interrupt();
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Firmware entry point. Binds the manager, registers the demo driver and
/// runs the idle loop. Does not return.
#[entry]
fn main() -> ! {
    LPM.init(&LPCE, &KERNEL, &SLEEP)
        .expect("Failed to bind low-power manager");
    LPM.register_device(&LED)
        .expect("Failed to register led");

    // Allow down to Deep; Led vetoes it every other period.
    LPM.request_mode(SleepMode::Deep);

    loop {
        // Busy only means "not this time".
        let _ = LPM.run_idle_cycle();
    }
}
