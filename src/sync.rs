//! # Synchronization Primitives
//!
//! Interrupt-safe critical section abstractions. The constraint table and
//! the sleep-episode state are touched from both the idle task and interrupt
//! handlers, so every access happens with interrupts masked.
//!
//! On the target the `critical-section` implementation comes from
//! `cortex-m`'s `critical-section-single-core` feature (PRIMASK based).

use core::marker::PhantomData;

use critical_section::{CriticalSection, RestoreState};

use crate::platform::Kernel;

/// Execute a closure within a critical section (interrupts disabled).
///
/// Interrupts are disabled on entry and restored on exit. Keep the
/// enclosed work short; it adds directly to interrupt latency.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}

/// Scoped interrupt mask: disables on creation, restores on drop.
///
/// Used where a critical section has to end at a point that is not the end
/// of a closure. The idle cycle unmasks right before the sleep instruction.
///
/// ```ignore
/// let irq = IrqGuard::new();
/// // ... interrupts masked ...
/// drop(irq);
/// ```
pub struct IrqGuard {
    state: RestoreState,
    // Must be dropped on the core that created it.
    _not_send: PhantomData<*mut ()>,
}

impl IrqGuard {
    pub fn new() -> Self {
        // SAFETY: released exactly once, in Drop.
        let state = unsafe { critical_section::acquire() };
        Self {
            state,
            _not_send: PhantomData,
        }
    }

    /// Token proving interrupts are masked for the guard's lifetime.
    #[inline]
    pub fn token(&self) -> CriticalSection<'_> {
        // SAFETY: the guard holds the critical section until it is dropped,
        // and the token cannot outlive the borrow of the guard.
        unsafe { CriticalSection::new() }
    }
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        // SAFETY: `state` came from the matching acquire in `new`.
        unsafe { critical_section::release(self.state) }
    }
}

/// Scheduler lock held for the whole idle cycle.
pub struct SchedulerLock<'a> {
    kernel: &'a dyn Kernel,
}

impl<'a> SchedulerLock<'a> {
    pub fn new(kernel: &'a dyn Kernel) -> Self {
        kernel.schedule_lock();
        Self { kernel }
    }
}

impl Drop for SchedulerLock<'_> {
    fn drop(&mut self) {
        self.kernel.schedule_unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use critical_section::Mutex;

    #[test]
    fn test_guard_token_grants_mutex_access() {
        static VALUE: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

        let guard = IrqGuard::new();
        VALUE.borrow(guard.token()).set(7);
        drop(guard);

        let seen = critical_section(|cs| VALUE.borrow(cs).get());
        assert_eq!(seen, 7);
    }

    #[test]
    fn test_guard_nests_with_closure_form() {
        let guard = IrqGuard::new();
        let inner = critical_section(|_cs| 42);
        drop(guard);
        assert_eq!(inner, 42);
    }
}
