//! Fixed table of observer callbacks.

use log::debug;

use crate::consts::CALLBACK_SLOTS;
use crate::error::MonitorError;
use crate::sync::{InterruptLevel, PlatformLevel, PriorityLock};

use super::{VariableCallback, VariableCallbackParameters};

type Slots = [Option<VariableCallback>; CALLBACK_SLOTS];

/// Callbacks are compared by address.
fn same(a: VariableCallback, b: VariableCallback) -> bool {
    a as usize == b as usize
}

pub struct CallbackRegistry<L: InterruptLevel = PlatformLevel> {
    slots: PriorityLock<Slots, L>,
}

impl<L: InterruptLevel> CallbackRegistry<L> {
    pub const fn new() -> Self {
        Self { slots: PriorityLock::new([None; CALLBACK_SLOTS]) }
    }

    /// Claim the first free slot for `callback`; returns the slot index.
    pub fn register(&self, callback: VariableCallback) -> Result<usize, MonitorError> {
        let mut slots = self.slots.lock();
        if slots.iter().flatten().any(|&cb| same(cb, callback)) {
            return Err(MonitorError::InvalidParameter);
        }
        let index = slots
            .iter()
            .position(Option::is_none)
            .ok_or(MonitorError::OutOfResources)?;
        slots[index] = Some(callback);
        drop(slots);

        debug!("callback {:#x} registered in slot {}", callback as usize, index);
        Ok(index)
    }

    /// Clear the slot holding `callback`; returns the slot index.
    pub fn unregister(&self, callback: VariableCallback) -> Result<usize, MonitorError> {
        let mut slots = self.slots.lock();
        let index = slots
            .iter()
            .position(|slot| slot.is_some_and(|cb| same(cb, callback)))
            .ok_or(MonitorError::InvalidParameter)?;
        slots[index] = None;
        drop(slots);

        debug!("callback {:#x} unregistered from slot {}", callback as usize, index);
        Ok(index)
    }

    /// Drop every registration.
    pub fn clear(&self) {
        *self.slots.lock() = [None; CALLBACK_SLOTS];
    }

    pub fn len(&self) -> usize {
        self.slots.lock().iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every registered callback in slot order.
    ///
    /// All of them run even after one has vetoed, and each sees whatever
    /// the earlier ones wrote through `params`. The lock is held for the
    /// whole walk: callbacks must not block or come back into the registry.
    pub fn invoke(&self, params: &mut VariableCallbackParameters) -> Result<(), MonitorError> {
        let raw: *mut VariableCallbackParameters = params;
        let slots = self.slots.lock();
        let blocked = slots
            .iter()
            .flatten()
            .fold(false, |blocked, cb| bool::from(cb(raw)) | blocked);
        drop(slots);

        if blocked { Err(MonitorError::AccessDenied) } else { Ok(()) }
    }
}

impl<L: InterruptLevel> Default for CallbackRegistry<L> {
    fn default() -> Self {
        Self::new()
    }
}
