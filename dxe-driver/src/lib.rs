//! Runtime DXE driver that monitors `GetVariable` / `SetVariable`.
//!
//! Loading the driver replaces both entries of the runtime services table
//! with handlers that
//!
//! 1. divert `GetVariable` calls carrying the backdoor vendor id to the
//!    command channel ([`dispatch`]),
//! 2. let registered observers inspect and veto the call ([`callbacks`]),
//! 3. call the original service,
//! 4. append the call and its outcome to a 256 KiB runtime log
//!    ([`communications::log_ring`]),
//! 5. notify observers of the outcome.
//!
//! Everything the handlers touch lives in one [`InterceptState`]. The UEFI
//! image keeps a single instance in a static; tests build their own.

#![cfg_attr(not(test), no_std)]

use core::ffi::c_void;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

use log::{error, info};
use r_efi::efi;

pub mod callbacks;
pub mod communications;
pub mod consts;
pub mod dispatch;
pub mod error;
pub mod firmware;
pub mod helpers;
pub mod hooks;
pub mod intercept;
pub mod serial_log;
pub mod sync;
#[cfg(target_os = "uefi")]
pub mod system_table;

use callbacks::CallbackRegistry;
use communications::log_ring::LogRing;
use consts::{LOG_BUFFER_PAGES, PAGE_SIZE};
use error::MonitorError;
use firmware::{Firmware, ServiceSlot};
use hooks::ServiceHook;
use sync::{InterruptLevel, PlatformLevel};

/// Entry points installed into the firmware.
#[derive(Clone, Copy)]
pub struct Handlers {
    pub get_variable: efi::RuntimeGetVariable,
    pub set_variable: efi::RuntimeSetVariable,
    /// Receives the virtual address change notification.
    pub address_change: efi::EventNotify,
}

pub struct InterceptState<L: InterruptLevel = PlatformLevel> {
    pub(crate) get_variable: ServiceHook,
    pub(crate) set_variable: ServiceHook,
    pub(crate) ring: LogRing<L>,
    pub(crate) callbacks: CallbackRegistry<L>,
    buffer_pages: usize,
    event: AtomicPtr<c_void>,
    relocated: AtomicBool,
}

impl<L: InterruptLevel> InterceptState<L> {
    pub const fn new() -> Self {
        Self::with_pages(LOG_BUFFER_PAGES)
    }

    /// Same as [`new`](Self::new) with a log of `pages` pages.
    pub const fn with_pages(pages: usize) -> Self {
        Self {
            get_variable: ServiceHook::new(ServiceSlot::GetVariable),
            set_variable: ServiceHook::new(ServiceSlot::SetVariable),
            ring: LogRing::new(),
            callbacks: CallbackRegistry::new(),
            buffer_pages: pages,
            event: AtomicPtr::new(ptr::null_mut()),
            relocated: AtomicBool::new(false),
        }
    }

    pub fn ring(&self) -> &LogRing<L> {
        &self.ring
    }

    pub fn callbacks(&self) -> &CallbackRegistry<L> {
        &self.callbacks
    }

    pub fn hook(&self, slot: ServiceSlot) -> &ServiceHook {
        match slot {
            ServiceSlot::GetVariable => &self.get_variable,
            ServiceSlot::SetVariable => &self.set_variable,
        }
    }

    /// Allocate the log, subscribe to the address change and hook both
    /// services. On failure everything done so far is undone.
    pub fn init(&self, fw: &dyn Firmware, handlers: &Handlers) -> Result<(), MonitorError> {
        info!("Driver being loaded");
        if self.ring.capacity() != 0 {
            error!("Driver already initialised");
            return Err(MonitorError::InvalidParameter);
        }

        let result = self.install(fw, handlers);
        if let Err(err) = result {
            error!("Initialisation failed : {}", err);
            self.teardown(fw);
        }
        result
    }

    fn install(&self, fw: &dyn Firmware, handlers: &Handlers) -> Result<(), MonitorError> {
        // Everything the handlers use must exist before the first hook goes in.
        let base = fw.allocate_runtime_pages(self.buffer_pages).map_err(|status| {
            error!("AllocateRuntimePages failed : {:#x}", status.as_usize());
            MonitorError::OutOfResources
        })?;
        // SAFETY: fresh runtime pages, owned by the ring until teardown.
        unsafe { self.ring.attach(base, self.buffer_pages * PAGE_SIZE) };
        self.relocated.store(false, Ordering::Release);

        let context = self as *const Self as *mut c_void;
        let event = fw
            .create_address_change_event(handlers.address_change, context)
            .map_err(|status| {
                error!("CreateEventEx failed : {:#x}", status.as_usize());
                MonitorError::Firmware(status)
            })?;
        self.event.store(event, Ordering::Release);

        self.get_variable
            .install(fw, handlers.get_variable as usize)
            .inspect_err(|err| error!("ExchangeTablePointer(GetVariable) failed : {}", err))?;
        self.set_variable
            .install(fw, handlers.set_variable as usize)
            .inspect_err(|err| error!("ExchangeTablePointer(SetVariable) failed : {}", err))?;
        Ok(())
    }

    /// Undo whatever `init` managed to do. Safe to call any number of
    /// times, including after a failed `init`. Boot time only.
    pub fn teardown(&self, fw: &dyn Firmware) {
        for hook in [&self.set_variable, &self.get_variable] {
            if let Err(err) = hook.uninstall(fw) {
                error!("restoring {} failed : {}", hook.slot().name(), err);
            }
        }

        let event = self.event.swap(ptr::null_mut(), Ordering::AcqRel);
        if !event.is_null() {
            fw.close_event(event);
        }

        if let Some((base, _)) = self.ring.detach() {
            fw.free_pages(base, self.buffer_pages);
        }
        self.callbacks.clear();
    }

    /// Translate every captured physical address for virtual addressing.
    /// Called from the address change notification; only the first call
    /// does anything. A failed conversion does not stop the others; the
    /// first error is returned once all of them were attempted.
    pub fn relocate(&self, fw: &dyn Firmware) -> Result<(), MonitorError> {
        if self.relocated.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let steps = [
            ("GetVariable", self.get_variable.relocate(fw)),
            ("SetVariable", self.set_variable.relocate(fw)),
            ("log buffer", self.ring.relocate(fw)),
        ];
        let mut first = Ok(());
        for (what, result) in steps {
            if let Err(err) = result {
                error!("relocating {} failed : {}", what, err);
                if first.is_ok() {
                    first = Err(err);
                }
            }
        }
        first
    }

    pub fn is_relocated(&self) -> bool {
        self.relocated.load(Ordering::Acquire)
    }
}

impl<L: InterruptLevel> Default for InterceptState<L> {
    fn default() -> Self {
        Self::new()
    }
}
