//! # Peripheral Suspend/Resume Chain
//!
//! The ordered list of drivers taking part in sleep. Suspend walks the
//! chain in order and stops at the first veto; resume walks it in the same
//! forward order and reaches every device, suspended or not.
//!
//! ```text
//!   head ──► [high-prio B] ──► [high-prio A] ──► [C] ──► [D] ◄── tail
//!   suspend: B, A, C, D   (stops at first Err)
//!   resume:  B, A, C, D   (always all)
//! ```
//!
//! The chain holds non-owning `'static` references; drivers own their
//! state. A device is identified by the address of its object.

use heapless::Vec;

use crate::config::MAX_DEVICES;
use crate::error::{LpmError, LpmResult};
use crate::mode::SleepMode;
use crate::platform::LowPowerDevice;

/// Fixed-capacity, registration-ordered device list.
#[derive(Clone)]
pub struct DeviceChain {
    devices: Vec<&'static dyn LowPowerDevice, MAX_DEVICES>,
}

impl DeviceChain {
    pub const fn new() -> Self {
        Self {
            devices: Vec::new(),
        }
    }

    /// Insert `device` at the head (`high_priority`) or the tail.
    ///
    /// Registering a device that is already present succeeds without
    /// changing its position.
    pub fn register(
        &mut self,
        device: &'static dyn LowPowerDevice,
        high_priority: bool,
    ) -> LpmResult<()> {
        if self.contains(device) {
            log::debug!("lpm: device {:p} already registered", device);
            return Ok(());
        }

        let inserted = if high_priority {
            self.devices.insert(0, device)
        } else {
            self.devices.push(device)
        };
        inserted.map_err(|_| LpmError::DeviceTableFull)?;

        log::debug!("lpm: registered device {:p}", device);
        Ok(())
    }

    /// Remove `device`; absent devices are ignored.
    pub fn unregister(&mut self, device: &'static dyn LowPowerDevice) {
        if let Some(pos) = self.position(device) {
            self.devices.remove(pos);
            log::debug!("lpm: unregistered device {:p}", device);
        }
    }

    /// Suspend every device for `mode`, in order, stopping at the first
    /// failure. Devices already suspended are left suspended.
    pub fn suspend_all(&self, mode: SleepMode) -> LpmResult<()> {
        self.devices
            .iter()
            .try_for_each(|device| device.suspend(mode))
    }

    /// Resume every device for `mode`, in the same order as suspend.
    pub fn resume_all(&self, mode: SleepMode) {
        for device in &self.devices {
            device.resume(mode);
        }
    }

    pub fn contains(&self, device: &'static dyn LowPowerDevice) -> bool {
        self.position(device).is_some()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static dyn LowPowerDevice> + '_ {
        self.devices.iter().copied()
    }

    fn position(&self, device: &'static dyn LowPowerDevice) -> Option<usize> {
        let wanted = device as *const dyn LowPowerDevice;
        self.devices
            .iter()
            .position(|d| core::ptr::addr_eq(*d as *const dyn LowPowerDevice, wanted))
    }
}

impl Default for DeviceChain {
    fn default() -> Self {
        Self::new()
    }
}
