//! Function-pointer hooks in the runtime services table.
//!
//! A hook remembers the pointer it displaced so the replacement can chain
//! to it and so unload can put it back. Both swaps happen at
//! `TPL_HIGH_LEVEL`: the table is visible to every caller in the system and
//! nobody may see the slot and the checksum out of step.

use core::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, error};

use crate::consts::PATCH_TPL;
use crate::error::MonitorError;
use crate::firmware::{Firmware, ServiceSlot};

pub struct ServiceHook {
    slot: ServiceSlot,
    /// Displaced service; 0 until the first install.
    original: AtomicUsize,
    /// Our handler; 0 until the first install.
    replacement: AtomicUsize,
}

impl ServiceHook {
    pub const fn new(slot: ServiceSlot) -> Self {
        Self { slot, original: AtomicUsize::new(0), replacement: AtomicUsize::new(0) }
    }

    pub fn slot(&self) -> ServiceSlot {
        self.slot
    }

    /// Address of the service this hook chains to.
    pub fn original(&self) -> Option<usize> {
        match self.original.load(Ordering::Acquire) {
            0 => None,
            addr => Some(addr),
        }
    }

    /// True while the table slot holds our replacement.
    pub fn is_installed(&self, fw: &dyn Firmware) -> bool {
        let ours = self.replacement.load(Ordering::Acquire);
        ours != 0 && fw.read_slot(self.slot) == ours
    }

    /// Put `replacement` into the slot and return what was there.
    ///
    /// The displaced pointer is published before the slot changes, so a
    /// call that races with the swap can already chain through it.
    pub fn install(&self, fw: &dyn Firmware, replacement: usize) -> Result<usize, MonitorError> {
        if replacement == 0 {
            return Err(MonitorError::InvalidParameter);
        }

        let tpl = fw.raise_tpl(PATCH_TPL);
        let previous = fw.read_slot(self.slot);
        if previous == replacement {
            fw.restore_tpl(tpl);
            return Err(MonitorError::InvalidParameter);
        }
        self.original.store(previous, Ordering::Release);
        self.replacement.store(replacement, Ordering::Release);
        fw.write_slot(self.slot, replacement);
        let crc = fw.refresh_crc32();
        fw.restore_tpl(tpl);

        if let Err(status) = crc {
            error!("CalculateCrc32 after hooking {} failed : {:#x}", self.slot.name(), status.as_usize());
            return Err(MonitorError::Firmware(status));
        }
        debug!("{} hooked: {:#x} -> {:#x}", self.slot.name(), previous, replacement);
        Ok(previous)
    }

    /// Restore the displaced pointer if the slot still holds ours.
    ///
    /// Returns whether anything was restored. Someone else may have hooked
    /// the slot on top of us; their pointer is left alone.
    pub fn uninstall(&self, fw: &dyn Firmware) -> Result<bool, MonitorError> {
        let ours = self.replacement.load(Ordering::Acquire);
        let original = self.original.load(Ordering::Acquire);
        if ours == 0 || original == 0 {
            return Ok(false);
        }

        let tpl = fw.raise_tpl(PATCH_TPL);
        if fw.read_slot(self.slot) != ours {
            fw.restore_tpl(tpl);
            return Ok(false);
        }
        fw.write_slot(self.slot, original);
        let crc = fw.refresh_crc32();
        fw.restore_tpl(tpl);

        crc.map_err(MonitorError::Firmware)?;
        debug!("{} restored to {:#x}", self.slot.name(), original);
        Ok(true)
    }

    /// Translate the chained pointer for virtual addressing.
    pub fn relocate(&self, fw: &dyn Firmware) -> Result<(), MonitorError> {
        let Some(current) = self.original() else {
            return Ok(());
        };
        let relocated = fw.convert_pointer(current).map_err(MonitorError::Firmware)?;
        self.original.store(relocated, Ordering::Release);
        debug!("{} relocated from {:#x} to {:#x}", self.slot.name(), current, relocated);
        Ok(())
    }
}
