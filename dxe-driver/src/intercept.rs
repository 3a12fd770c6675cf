//! The replacement GetVariable / SetVariable bodies.
//!
//! Order of events for one call:
//!
//! ```text
//! backdoor? ──yes──> dispatch::Backdoor            (GetVariable only)
//!    │no
//! Pre observers ──veto──> ACCESS_DENIED            (nothing logged)
//!    │
//! original service
//!    │
//! LogRing::append
//!    │
//! Post observers                                   (return value ignored)
//!    │
//! original status
//! ```

use core::ffi::c_void;
use core::{mem, slice};

use log::warn;
use r_efi::efi;
use shared::status::StatusText;
use shared::wire::OperationKind;

use crate::InterceptState;
use crate::callbacks::{OperationType, Outcome, VariableCallbackParameters};
use crate::consts::NAME_CAPACITY;
use crate::dispatch::{Backdoor, is_backdoor};
use crate::error::into_status;
use crate::helpers::{wide_str, wire_guid};
use crate::sync::InterruptLevel;

impl<L: InterruptLevel> InterceptState<L> {
    fn original_get_variable(&self) -> Option<efi::RuntimeGetVariable> {
        // SAFETY: only ever holds what the table slot held, i.e. a
        // GetVariable implementation.
        self.get_variable
            .original()
            .map(|addr| unsafe { mem::transmute::<usize, efi::RuntimeGetVariable>(addr) })
    }

    fn original_set_variable(&self) -> Option<efi::RuntimeSetVariable> {
        // SAFETY: see `original_get_variable`.
        self.set_variable
            .original()
            .map(|addr| unsafe { mem::transmute::<usize, efi::RuntimeSetVariable>(addr) })
    }

    /// Replacement GetVariable.
    ///
    /// # Safety
    /// Arguments follow the UEFI GetVariable contract.
    pub unsafe fn get_variable(
        &self,
        variable_name: *mut efi::Char16,
        vendor_guid: *mut efi::Guid,
        attributes: *mut u32,
        data_size: *mut usize,
        data: *mut c_void,
    ) -> efi::Status {
        if vendor_guid.is_null() || data_size.is_null() {
            return efi::Status::INVALID_PARAMETER;
        }

        // SAFETY: checked non-null; caller owns both for the call.
        if is_backdoor(unsafe { &*vendor_guid }) {
            let name = unsafe { wide_str(variable_name, NAME_CAPACITY) };
            let backdoor = Backdoor { ring: &self.ring, callbacks: &self.callbacks };
            return into_status(unsafe { backdoor.handle(name, data, &mut *data_size) });
        }

        let Some(original) = self.original_get_variable() else {
            return efi::Status::UNSUPPORTED;
        };

        // Observers may rewrite any of these before the real call.
        let mut name = variable_name;
        let mut vendor = vendor_guid;
        let mut attrs = attributes;
        let mut size = data_size;
        let mut buffer = data;

        let mut pre = VariableCallbackParameters::for_get(
            OperationType::Pre,
            &mut name,
            &mut vendor,
            &mut attrs,
            &mut size,
            &mut buffer,
            None,
        );
        if let Err(err) = self.callbacks.invoke(&mut pre) {
            return err.into();
        }

        let status = original(name, vendor, attrs, size, buffer);

        let failed = status.is_error();
        // SAFETY: the service accepted these pointers.
        let logged_size = if failed || size.is_null() { 0 } else { unsafe { *size } };
        let logged_attrs = if failed || attrs.is_null() { 0 } else { unsafe { *attrs } };
        unsafe { self.record(OperationKind::Get, name, vendor, logged_attrs, status, buffer, logged_size) };

        let text = StatusText::for_status(status.as_usize());
        let mut post = VariableCallbackParameters::for_get(
            OperationType::Post,
            &mut name,
            &mut vendor,
            &mut attrs,
            &mut size,
            &mut buffer,
            Some(Outcome { status, message: text.as_field() }),
        );
        let _ = self.callbacks.invoke(&mut post);

        status
    }

    /// Replacement SetVariable.
    ///
    /// # Safety
    /// Arguments follow the UEFI SetVariable contract.
    pub unsafe fn set_variable(
        &self,
        variable_name: *mut efi::Char16,
        vendor_guid: *mut efi::Guid,
        attributes: u32,
        data_size: usize,
        data: *mut c_void,
    ) -> efi::Status {
        if vendor_guid.is_null() {
            return efi::Status::INVALID_PARAMETER;
        }
        // The backdoor namespace never reaches the variable store.
        if is_backdoor(unsafe { &*vendor_guid }) {
            warn!("SetVariable on the backdoor vendor rejected");
            return efi::Status::INVALID_PARAMETER;
        }

        let Some(original) = self.original_set_variable() else {
            return efi::Status::UNSUPPORTED;
        };

        let mut name = variable_name;
        let mut vendor = vendor_guid;
        let mut attrs = attributes;
        let mut size = data_size;
        let mut buffer = data;

        let mut pre = VariableCallbackParameters::for_set(
            OperationType::Pre,
            &mut name,
            &mut vendor,
            &mut attrs,
            &mut size,
            &mut buffer,
            None,
        );
        if let Err(err) = self.callbacks.invoke(&mut pre) {
            return err.into();
        }

        let status = original(name, vendor, attrs, size, buffer);

        let logged_size = if status.is_error() { 0 } else { size };
        unsafe { self.record(OperationKind::Set, name, vendor, attrs, status, buffer, logged_size) };

        let text = StatusText::for_status(status.as_usize());
        let mut post = VariableCallbackParameters::for_set(
            OperationType::Post,
            &mut name,
            &mut vendor,
            &mut attrs,
            &mut size,
            &mut buffer,
            Some(Outcome { status, message: text.as_field() }),
        );
        let _ = self.callbacks.invoke(&mut post);

        status
    }

    /// Append one call to the log. A null name is logged as empty, a null
    /// vendor as the zero GUID.
    #[allow(clippy::too_many_arguments)]
    unsafe fn record(
        &self,
        kind: OperationKind,
        name: *const efi::Char16,
        vendor: *const efi::Guid,
        attributes: u32,
        status: efi::Status,
        data: *const c_void,
        size: usize,
    ) {
        let name = unsafe { wide_str(name, NAME_CAPACITY - 1) };
        let vendor = unsafe { vendor.as_ref() }.map(wire_guid).unwrap_or_default();
        let payload = if size == 0 || data.is_null() {
            &[][..]
        } else {
            // SAFETY: the service reported `size` valid bytes at `data`.
            unsafe { slice::from_raw_parts(data.cast::<u8>(), size) }
        };
        self.ring.append(kind, name, vendor, attributes, status.as_usize(), payload);
    }
}
