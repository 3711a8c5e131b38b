//! # Low-Power Manager
//!
//! The tickless sleep orchestrator and the interrupt-entry reconciliation
//! hook, tied to the constraint registry and the device chain.
//!
//! ## Idle Cycle
//!
//! ```text
//!  run_idle_cycle()                        [scheduler locked throughout]
//!    │ mode <= Idle ──────────────────────────────────────► return Ok
//!    ▼
//!  PROBING   irq masked; suspend all @ Light ── veto ──► resume @ Light ×2, Busy
//!    ▼
//!  ARMED     ticks until wake → nsec
//!            forever: stop clock          too short: resume @ Light, Busy
//!            else: clamp, arm one-shot
//!    ▼
//!  SLEEPING  suspend all @ mode ── veto ──► resume @ mode ×2, Busy
//!            phase = Active, irq unmasked, sleep(mode)
//!    ▼
//!  RECONCILING (irq_entry, once per interrupt)
//!            Active → publish elapsed nsec → Updated; re-arm 1 ms guard
//!    ▼
//!  resume all @ mode, phase = None ───────────────────────► return Ok
//! ```
//!
//! The manager is a process-wide object built with a `const fn` so it can
//! sit in a `static`; [`LowPowerManager::init`] binds it to the low-power
//! clock once at boot.

use core::cell::{Cell, RefCell};

use critical_section::{CriticalSection, Mutex};
use heapless::Vec;

use crate::config::{
    GUARD_NSEC, LPCE_PROBE_NSEC, LPCE_PROBE_SPINS, MAX_UPDATE_CALLBACKS, MIN_SLEEP_MS,
    NSEC_PER_SEC, PROBE_MODE, TICK_HZ,
};
use crate::constraint::ConstraintTable;
use crate::convert::TickConverter;
use crate::device::DeviceChain;
use crate::error::{LpmError, LpmResult};
use crate::mode::{SleepMode, MODE_COUNT};
use crate::platform::{
    ClockEvent, ClockEventHandler, Kernel, LowPowerDevice, SleepEvent, SleepNotify,
    SleepPrimitive, SleepTimeUpdate,
};
use crate::sync::{self, IrqGuard, SchedulerLock};

// ---------------------------------------------------------------------------
// Sleep episode state
// ---------------------------------------------------------------------------

/// Where the current sleep episode stands, as seen by the interrupt hook.
///
/// Transitions only ever run `None → Active → Updated → None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepPhase {
    /// No episode in progress.
    None,
    /// CPU asleep (or about to be); elapsed time not yet reconciled.
    Active,
    /// Elapsed time published; waiting for the idle task to resume drivers.
    Updated,
}

#[derive(Debug, Clone, Copy)]
struct Episode {
    phase: SleepPhase,
    /// Armed duration, replaced by the measured one on an early wake.
    /// Zero when the episode has no upper bound.
    sleep_nsec: u64,
}

impl Episode {
    const IDLE: Self = Self {
        phase: SleepPhase::None,
        sleep_nsec: 0,
    };
}

/// Diagnostic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SleepStats {
    /// Completed sleep episodes.
    pub episodes: u32,
    /// Idle cycles aborted as busy.
    pub busy: u32,
    /// Episodes ended by an interrupt other than the low-power clock.
    pub early_wakes: u32,
    /// Total reconciled sleep time.
    pub slept_nsec: u64,
}

impl SleepStats {
    const ZERO: Self = Self {
        episodes: 0,
        busy: 0,
        early_wakes: 0,
        slept_nsec: 0,
    };

    // Counters saturate; the idle loop may abort as busy indefinitely.

    fn record_episode(&mut self) {
        self.episodes = self.episodes.saturating_add(1);
    }

    fn record_busy(&mut self) {
        self.busy = self.busy.saturating_add(1);
    }

    fn record_early_wake(&mut self) {
        self.early_wakes = self.early_wakes.saturating_add(1);
    }

    fn record_slept(&mut self, nsec: u64) {
        self.slept_nsec = self.slept_nsec.saturating_add(nsec);
    }
}

// ---------------------------------------------------------------------------
// Clock binding and update consumers
// ---------------------------------------------------------------------------

/// Everything `init` discovers; immutable afterwards.
#[derive(Clone, Copy)]
struct Binding {
    lpce: &'static dyn ClockEvent,
    lpce_irq: u32,
    kernel: &'static dyn Kernel,
    sleep: &'static dyn SleepPrimitive,
    convert: TickConverter,
}

#[derive(Clone, Copy)]
enum UpdateConsumer {
    /// The kernel tick counter, advanced by the slept ticks.
    KernelTick,
    Callback(&'static dyn SleepTimeUpdate),
}

impl UpdateConsumer {
    fn is(&self, cb: &'static dyn SleepTimeUpdate) -> bool {
        match self {
            UpdateConsumer::KernelTick => false,
            UpdateConsumer::Callback(own) => core::ptr::addr_eq(
                *own as *const dyn SleepTimeUpdate,
                cb as *const dyn SleepTimeUpdate,
            ),
        }
    }
}

type UpdateList = Vec<UpdateConsumer, MAX_UPDATE_CALLBACKS>;

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Tickless low-power manager.
///
/// Every field is guarded by an interrupt-masked critical section. All
/// operations except [`Self::init`] and [`Self::run_idle_cycle`] may be
/// called from interrupt context: `init` spins waiting for the clock's
/// probe interrupt, and the idle cycle sleeps.
pub struct LowPowerManager {
    constraints: Mutex<RefCell<ConstraintTable>>,
    devices: Mutex<RefCell<DeviceChain>>,
    updates: Mutex<RefCell<UpdateList>>,
    notify: Mutex<Cell<Option<&'static dyn SleepNotify>>>,
    binding: Mutex<Cell<Option<Binding>>>,
    probed_irq: Mutex<Cell<Option<u32>>>,
    episode: Mutex<Cell<Episode>>,
    stats: Mutex<Cell<SleepStats>>,
}

impl LowPowerManager {
    /// An unbound manager. The resolved mode starts at `Idle`, so nothing
    /// sleeps deeper until a constraint is requested.
    pub const fn new() -> Self {
        Self {
            constraints: Mutex::new(RefCell::new(ConstraintTable::new(SleepMode::Idle))),
            devices: Mutex::new(RefCell::new(DeviceChain::new())),
            updates: Mutex::new(RefCell::new(Vec::new())),
            notify: Mutex::new(Cell::new(None)),
            binding: Mutex::new(Cell::new(None)),
            probed_irq: Mutex::new(Cell::new(None)),
            episode: Mutex::new(Cell::new(Episode::IDLE)),
            stats: Mutex::new(Cell::new(SleepStats::ZERO)),
        }
    }

    /// Bind the manager to its low-power clock, kernel and sleep routine.
    ///
    /// The clock's IRQ number is discovered by arming a short one-shot with
    /// the manager installed as its event handler and waiting (bounded) for
    /// the expiry to report in. The kernel tick counter becomes the first
    /// sleep-time consumer.
    pub fn init(
        &'static self,
        lpce: &'static dyn ClockEvent,
        kernel: &'static dyn Kernel,
        sleep: &'static dyn SleepPrimitive,
    ) -> LpmResult<()> {
        if self.binding().is_some() {
            return Err(LpmError::AlreadyInitialized);
        }
        if lpce.prescaler_mask() != 1 {
            return Err(LpmError::UnsupportedClock);
        }

        let lpce_irq = self.probe_irq(lpce)?;
        log::info!("lpm: lpce {}, irq {}", lpce.name(), lpce_irq);

        let max_sec = lpce
            .mask()
            .checked_div(lpce.freq() as u64)
            .unwrap_or(0)
            .min(u32::MAX as u64) as u32;
        let convert = TickConverter::new(TICK_HZ, NSEC_PER_SEC, max_sec);
        log::info!(
            "lpm: tick->nsec mult {} shift {}, nsec->tick mult {} shift {}",
            convert.to_nsec.mult,
            convert.to_nsec.shift,
            convert.to_ticks.mult,
            convert.to_ticks.shift
        );

        self.bind(Binding {
            lpce,
            lpce_irq,
            kernel,
            sleep,
            convert,
        })
    }

    /// Install `binding` and the kernel tick consumer. The binding is checked
    /// again here since the probe ran outside any critical section.
    fn bind(&self, binding: Binding) -> LpmResult<()> {
        sync::critical_section(|cs| {
            let cell = self.binding.borrow(cs);
            if cell.get().is_some() {
                return Err(LpmError::AlreadyInitialized);
            }
            self.updates
                .borrow_ref_mut(cs)
                .insert(0, UpdateConsumer::KernelTick)
                .map_err(|_| LpmError::CallbackTableFull)?;
            cell.set(Some(binding));
            Ok(())
        })
    }

    fn probe_irq(&'static self, lpce: &'static dyn ClockEvent) -> LpmResult<u32> {
        sync::critical_section(|cs| self.probed_irq.borrow(cs).set(None));

        lpce.set_event_handler(Some(self));
        lpce.start_oneshot(LPCE_PROBE_NSEC);

        let mut spins = LPCE_PROBE_SPINS;
        while self.probed().is_none() && spins > 0 {
            core::hint::spin_loop();
            spins -= 1;
        }

        lpce.stop();
        lpce.set_event_handler(None);

        self.probed().ok_or(LpmError::ClockIrqNotFound)
    }

    fn probed(&self) -> Option<u32> {
        sync::critical_section(|cs| self.probed_irq.borrow(cs).get())
    }

    fn binding(&self) -> Option<Binding> {
        sync::critical_section(|cs| self.binding.borrow(cs).get())
    }

    pub fn is_initialized(&self) -> bool {
        self.binding().is_some()
    }

    /// IRQ number of the bound low-power clock.
    pub fn lpce_irq(&self) -> Option<u32> {
        self.binding().map(|b| b.lpce_irq)
    }

    // -----------------------------------------------------------------------
    // Constraint voting
    // -----------------------------------------------------------------------

    /// Forbid sleeping deeper than `mode` until the matching release.
    pub fn request_mode(&self, mode: SleepMode) -> SleepMode {
        sync::critical_section(|cs| self.constraints.borrow_ref_mut(cs).request(mode))
    }

    /// Drop one constraint previously requested for `mode`.
    pub fn release_mode(&self, mode: SleepMode) -> SleepMode {
        sync::critical_section(|cs| self.constraints.borrow_ref_mut(cs).release(mode))
    }

    /// The currently permitted sleep mode.
    pub fn current_mode(&self) -> SleepMode {
        sync::critical_section(|cs| self.constraints.borrow_ref(cs).current())
    }

    pub fn constraint_counts(&self) -> [u8; MODE_COUNT] {
        sync::critical_section(|cs| self.constraints.borrow_ref(cs).counts())
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    pub fn register_device(&self, device: &'static dyn LowPowerDevice) -> LpmResult<()> {
        sync::critical_section(|cs| self.devices.borrow_ref_mut(cs).register(device, false))
    }

    /// Register `device` ahead of everything already in the chain.
    pub fn register_device_high_priority(
        &self,
        device: &'static dyn LowPowerDevice,
    ) -> LpmResult<()> {
        sync::critical_section(|cs| self.devices.borrow_ref_mut(cs).register(device, true))
    }

    pub fn unregister_device(&self, device: &'static dyn LowPowerDevice) {
        sync::critical_section(|cs| self.devices.borrow_ref_mut(cs).unregister(device))
    }

    /// Snapshot of the device chain.
    pub fn devices(&self) -> DeviceChain {
        sync::critical_section(|cs| self.devices.borrow_ref(cs).clone())
    }

    /// Add a consumer of reconciled sleep time. Registering the same
    /// consumer twice is a no-op.
    pub fn register_update_callback(&self, cb: &'static dyn SleepTimeUpdate) -> LpmResult<()> {
        sync::critical_section(|cs| {
            let mut updates = self.updates.borrow_ref_mut(cs);
            if updates.iter().any(|c| c.is(cb)) {
                return Ok(());
            }
            updates
                .push(UpdateConsumer::Callback(cb))
                .map_err(|_| LpmError::CallbackTableFull)
        })
    }

    /// Install the hook told about every sleep entry and exit.
    pub fn set_notify(&self, notify: &'static dyn SleepNotify) {
        sync::critical_section(|cs| self.notify.borrow(cs).set(Some(notify)));
        log::debug!("lpm: notify hook {:p} installed", notify);
    }

    pub fn phase(&self) -> SleepPhase {
        sync::critical_section(|cs| self.episode.borrow(cs).get().phase)
    }

    pub fn stats(&self) -> SleepStats {
        sync::critical_section(|cs| self.stats.borrow(cs).get())
    }

    fn update_stats(&self, cs: CriticalSection<'_>, f: impl FnOnce(&mut SleepStats)) {
        let cell = self.stats.borrow(cs);
        let mut stats = cell.get();
        f(&mut stats);
        cell.set(stats);
    }

    // -----------------------------------------------------------------------
    // Idle cycle
    // -----------------------------------------------------------------------

    /// Put the CPU to sleep for as long as the kernel allows, in the mode
    /// the constraints allow. Called by the idle task.
    ///
    /// Returns `Ok` after a completed episode or when the permitted mode is
    /// not deeper than `Idle`, and [`LpmError::Busy`] when a driver vetoed
    /// or the idle window was too short. Either way every driver is resumed.
    pub fn run_idle_cycle(&self) -> LpmResult<()> {
        let binding = self.binding().ok_or(LpmError::NotInitialized)?;
        let _sched = SchedulerLock::new(binding.kernel);

        if self.current_mode() <= SleepMode::Idle {
            return Ok(());
        }

        let result = self.sleep_episode(&binding);
        if result == Err(LpmError::Busy) {
            sync::critical_section(|cs| self.update_stats(cs, SleepStats::record_busy));
        }
        result
    }

    fn sleep_episode(&self, b: &Binding) -> LpmResult<()> {
        let irq = IrqGuard::new();
        let devices = self.devices.borrow_ref(irq.token()).clone();

        // Cheap veto round before touching the clock. A veto exits twice:
        // once inside enter_sleep and once here.
        if self.enter_sleep(&devices, PROBE_MODE).is_err() {
            self.exit_sleep(&devices, PROBE_MODE);
            return Err(LpmError::Busy);
        }

        let sleep_nsec = match b.kernel.sleep_ticks() {
            Some(ticks) => {
                let nsec = b.convert.ticks_to_nsec(ticks);
                if nsec < b.lpce.min_nsec() || nsec < MIN_SLEEP_MS * 1_000_000 {
                    self.exit_sleep(&devices, PROBE_MODE);
                    return Err(LpmError::Busy);
                }
                let nsec = nsec.min(b.lpce.max_nsec());
                b.lpce.start_oneshot(nsec);
                nsec
            }
            None => {
                b.lpce.stop();
                0
            }
        };
        self.episode.borrow(irq.token()).set(Episode {
            phase: SleepPhase::None,
            sleep_nsec,
        });

        // The probe suspend is not undone before the real one.
        let mode = self.constraints.borrow_ref(irq.token()).current();
        if self.enter_sleep(&devices, mode).is_err() {
            self.exit_sleep(&devices, mode);
            return Err(LpmError::Busy);
        }

        self.episode.borrow(irq.token()).set(Episode {
            phase: SleepPhase::Active,
            sleep_nsec,
        });
        drop(irq);

        if let Err(err) = b.sleep.sleep(mode) {
            log::warn!("lpm: sleep in {} failed: {}", mode, err);
        }

        self.exit_sleep(&devices, mode);

        let phase = sync::critical_section(|cs| {
            let cell = self.episode.borrow(cs);
            let phase = cell.get().phase;
            cell.set(Episode::IDLE);
            self.update_stats(cs, SleepStats::record_episode);
            phase
        });
        if phase == SleepPhase::Active {
            log::warn!("lpm: woke from {} without an interrupt", mode);
        }

        Ok(())
    }

    /// Announce the sleep and suspend every device. On a veto every device
    /// is resumed and `ExitSleep` announced before returning `Busy`.
    fn enter_sleep(&self, devices: &DeviceChain, mode: SleepMode) -> LpmResult<()> {
        self.notify(SleepEvent::EnterSleep, mode);
        if let Err(err) = devices.suspend_all(mode) {
            log::debug!("lpm: suspend to {} vetoed: {}", mode, err);
            self.exit_sleep(devices, mode);
            return Err(LpmError::Busy);
        }
        Ok(())
    }

    fn exit_sleep(&self, devices: &DeviceChain, mode: SleepMode) {
        devices.resume_all(mode);
        self.notify(SleepEvent::ExitSleep, mode);
    }

    fn notify(&self, event: SleepEvent, mode: SleepMode) {
        if let Some(notify) = sync::critical_section(|cs| self.notify.borrow(cs).get()) {
            notify.notify(event, mode);
        }
    }

    // -----------------------------------------------------------------------
    // Interrupt entry hook
    // -----------------------------------------------------------------------

    /// Reconcile a sleep episode with the kernel clock. Must be called on
    /// every interrupt entry, before the interrupt's own handler.
    ///
    /// The first interrupt of an episode publishes the slept time: the armed
    /// duration if `irq` is the low-power clock, the clock's elapsed count
    /// otherwise. Every interrupt taken while an episode is open re-arms the
    /// clock with a short guard period so the CPU cannot sleep unbounded
    /// before the idle task closes the episode.
    pub fn irq_entry(&self, irq: u32) {
        sync::critical_section(|cs| {
            let Some(b) = self.binding.borrow(cs).get() else {
                return;
            };
            let cell = self.episode.borrow(cs);
            let mut episode = cell.get();

            if episode.phase == SleepPhase::Active {
                if episode.sleep_nsec != 0 {
                    if irq != b.lpce_irq {
                        episode.sleep_nsec = b.lpce.read();
                        b.lpce.stop();
                        self.update_stats(cs, SleepStats::record_early_wake);
                    }
                    self.publish(cs, &b, episode.sleep_nsec);
                }
                episode.phase = SleepPhase::Updated;
            }

            if episode.phase != SleepPhase::None {
                b.lpce.start_oneshot(GUARD_NSEC.max(b.lpce.min_nsec()));
            }

            cell.set(episode);
        });
    }

    fn publish(&self, cs: CriticalSection<'_>, b: &Binding, nsec: u64) {
        if nsec == 0 {
            return;
        }
        self.update_stats(cs, |s| s.record_slept(nsec));

        let consumers = self.updates.borrow_ref(cs).clone();
        for consumer in &consumers {
            match consumer {
                UpdateConsumer::KernelTick => b.kernel.advance_ticks(b.convert.nsec_to_ticks(nsec)),
                UpdateConsumer::Callback(cb) => cb.on_sleep_elapsed(nsec),
            }
        }
    }
}

impl Default for LowPowerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockEventHandler for LowPowerManager {
    /// Records which IRQ the clock's probe expiry arrived on.
    fn on_event(&self, irq: u32) {
        sync::critical_section(|cs| self.probed_irq.borrow(cs).set(Some(irq)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_manager_refuses_idle_cycle() {
        let lpm = LowPowerManager::new();
        assert_eq!(lpm.run_idle_cycle(), Err(LpmError::NotInitialized));
        assert!(!lpm.is_initialized());
        assert_eq!(lpm.lpce_irq(), None);
    }

    #[test]
    fn test_votes_work_before_binding() {
        let lpm = LowPowerManager::new();
        assert_eq!(lpm.current_mode(), SleepMode::Idle);
        assert_eq!(lpm.request_mode(SleepMode::Deep), SleepMode::Deep);
        assert_eq!(lpm.request_mode(SleepMode::Light), SleepMode::Light);
        assert_eq!(lpm.release_mode(SleepMode::Light), SleepMode::Deep);
        assert_eq!(lpm.constraint_counts()[SleepMode::Deep.index()], 1);
    }

    #[test]
    fn test_irq_entry_before_binding_is_ignored() {
        let lpm = LowPowerManager::new();
        lpm.irq_entry(15);
        assert_eq!(lpm.phase(), SleepPhase::None);
        assert_eq!(lpm.stats(), SleepStats::default());
    }

    struct NullClock;

    impl ClockEvent for NullClock {
        fn name(&self) -> &str {
            "null"
        }
        fn min_nsec(&self) -> u64 {
            0
        }
        fn max_nsec(&self) -> u64 {
            u64::MAX
        }
        fn mask(&self) -> u64 {
            0xFFFF_FFFF
        }
        fn freq(&self) -> u32 {
            32_768
        }
        fn prescaler_mask(&self) -> u32 {
            1
        }
        fn start_oneshot(&self, _nsec: u64) {}
        fn stop(&self) {}
        fn read(&self) -> u64 {
            0
        }
        fn set_event_handler(&self, _handler: Option<&'static dyn ClockEventHandler>) {}
    }

    struct NullKernel;

    impl Kernel for NullKernel {
        fn schedule_lock(&self) {}
        fn schedule_unlock(&self) {}
        fn sleep_ticks(&self) -> Option<crate::platform::Tick> {
            None
        }
        fn advance_ticks(&self, _ticks: crate::platform::Tick) {}
    }

    struct NullSleep;

    impl SleepPrimitive for NullSleep {
        fn sleep(&self, _mode: SleepMode) -> LpmResult<()> {
            Ok(())
        }
    }

    static CLOCK: NullClock = NullClock;
    static KERNEL: NullKernel = NullKernel;
    static SLEEP: NullSleep = NullSleep;

    fn binding() -> Binding {
        Binding {
            lpce: &CLOCK,
            lpce_irq: 7,
            kernel: &KERNEL,
            sleep: &SLEEP,
            convert: TickConverter::new(TICK_HZ, NSEC_PER_SEC, 1),
        }
    }

    #[test]
    fn test_bind_twice_keeps_single_kernel_consumer() {
        let lpm = LowPowerManager::new();
        assert_eq!(lpm.bind(binding()), Ok(()));
        assert_eq!(lpm.bind(binding()), Err(LpmError::AlreadyInitialized));

        let kernel_consumers = sync::critical_section(|cs| {
            lpm.updates
                .borrow_ref(cs)
                .iter()
                .filter(|c| matches!(c, UpdateConsumer::KernelTick))
                .count()
        });
        assert_eq!(kernel_consumers, 1);
        assert_eq!(lpm.lpce_irq(), Some(7));
    }

    #[test]
    fn test_stats_saturate_instead_of_overflowing() {
        let lpm = LowPowerManager::new();
        sync::critical_section(|cs| {
            lpm.stats.borrow(cs).set(SleepStats {
                episodes: u32::MAX,
                busy: u32::MAX,
                early_wakes: u32::MAX,
                slept_nsec: u64::MAX - 1,
            });
            lpm.update_stats(cs, SleepStats::record_busy);
            lpm.update_stats(cs, SleepStats::record_episode);
            lpm.update_stats(cs, SleepStats::record_early_wake);
            lpm.update_stats(cs, |s| s.record_slept(10));
        });

        let stats = lpm.stats();
        assert_eq!(stats.busy, u32::MAX);
        assert_eq!(stats.episodes, u32::MAX);
        assert_eq!(stats.early_wakes, u32::MAX);
        assert_eq!(stats.slept_nsec, u64::MAX);
    }

    #[test]
    fn test_probe_handler_records_irq() {
        let lpm = LowPowerManager::new();
        assert_eq!(lpm.probed(), None);
        lpm.on_event(42);
        assert_eq!(lpm.probed(), Some(42));
    }
}
