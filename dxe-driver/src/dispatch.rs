//! Backdoor command channel on top of GetVariable.
//!
//! A GetVariable call whose vendor id is [`BACKDOOR_GUID`] never reaches
//! the variable store. The variable name selects a command and the
//! data buffer carries its argument:
//!
//! | name                  | data                         | result |
//! |-----------------------|------------------------------|--------|
//! | `RegisterCallbacks`   | one pointer: the callback    | slot claimed |
//! | `UnregisterCallbacks` | one pointer: the callback    | slot cleared |
//! | `DrainBuffer`         | log-sized buffer (or size 0) | log moved out, size = bytes |
//!
//! Anything else under the backdoor vendor id is `INVALID_PARAMETER`.

use core::ffi::c_void;
use core::mem::size_of;
use core::{ptr, slice};

use log::debug;
use r_efi::efi;
use shared::constants::{CMD_DRAIN_BUFFER, CMD_REGISTER_CALLBACKS, CMD_UNREGISTER_CALLBACKS};

use crate::callbacks::{CallbackRegistry, VariableCallback};
use crate::communications::log_ring::LogRing;
use crate::consts::BACKDOOR_GUID;
use crate::error::MonitorError;
use crate::helpers::{Wide, wide_eq};
use crate::sync::InterruptLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackdoorCommand {
    RegisterCallbacks,
    UnregisterCallbacks,
    DrainBuffer,
}

impl BackdoorCommand {
    pub fn parse(name: &[u16]) -> Option<Self> {
        [
            (CMD_REGISTER_CALLBACKS, Self::RegisterCallbacks),
            (CMD_UNREGISTER_CALLBACKS, Self::UnregisterCallbacks),
            (CMD_DRAIN_BUFFER, Self::DrainBuffer),
        ]
        .into_iter()
        .find_map(|(text, cmd)| wide_eq(name, text).then_some(cmd))
    }
}

pub fn is_backdoor(vendor: &efi::Guid) -> bool {
    *vendor == BACKDOOR_GUID
}

/// Routes backdoor commands to the log ring and the callback table.
pub struct Backdoor<'a, L: InterruptLevel> {
    pub ring: &'a LogRing<L>,
    pub callbacks: &'a CallbackRegistry<L>,
}

impl<L: InterruptLevel> Backdoor<'_, L> {
    /// Execute the command named `name`.
    ///
    /// # Safety
    /// `data` must be null or valid for `*data_size` bytes of reads and
    /// writes.
    pub unsafe fn handle(
        &self,
        name: &[u16],
        data: *mut c_void,
        data_size: &mut usize,
    ) -> Result<(), MonitorError> {
        let command = BackdoorCommand::parse(name);
        debug!("backdoor request {} -> {:?}", Wide(name), command);

        match command {
            Some(BackdoorCommand::RegisterCallbacks) => {
                let cb = unsafe { callback_argument(data, *data_size) }?;
                self.callbacks.register(cb).map(drop)
            }
            Some(BackdoorCommand::UnregisterCallbacks) => {
                let cb = unsafe { callback_argument(data, *data_size) }?;
                self.callbacks.unregister(cb).map(drop)
            }
            Some(BackdoorCommand::DrainBuffer) => unsafe { self.drain(data, data_size) },
            None => Err(MonitorError::InvalidParameter),
        }
    }

    unsafe fn drain(&self, data: *mut c_void, data_size: &mut usize) -> Result<(), MonitorError> {
        let capacity = self.ring.capacity();
        if *data_size < capacity {
            *data_size = capacity;
            return Err(MonitorError::BufferTooSmall { required: capacity });
        }
        if data.is_null() {
            return Err(MonitorError::InvalidParameter);
        }

        // SAFETY: caller vouches for `*data_size` bytes at `data`.
        let dest = unsafe { slice::from_raw_parts_mut(data.cast::<u8>(), *data_size) };
        match self.ring.drain_into(dest) {
            Ok(used) => {
                *data_size = used;
                Ok(())
            }
            Err(MonitorError::BufferTooSmall { required }) => {
                *data_size = required;
                Err(MonitorError::BufferTooSmall { required })
            }
            Err(err) => Err(err),
        }
    }
}

/// The data buffer must hold exactly one function pointer.
unsafe fn callback_argument(data: *mut c_void, size: usize) -> Result<VariableCallback, MonitorError> {
    if data.is_null() || size != size_of::<VariableCallback>() {
        return Err(MonitorError::InvalidParameter);
    }
    // SAFETY: checked non-null and pointer-sized above.
    let raw = unsafe { ptr::read_unaligned(data.cast::<usize>()) };
    if raw == 0 {
        return Err(MonitorError::InvalidParameter);
    }
    // SAFETY: the caller hands us the address of its callback; it stays
    // loaded until it unregisters.
    Ok(unsafe { core::mem::transmute::<usize, VariableCallback>(raw) })
}
