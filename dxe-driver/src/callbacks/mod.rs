//! Observer callbacks for GetVariable / SetVariable.
//!
//! Observers register a plain function pointer through the backdoor and
//! are then called twice per intercepted call:
//!
//! - **Pre**: before the real service runs. Returning TRUE from any
//!   observer vetoes the call, which then fails with `ACCESS_DENIED`.
//! - **Post**: after the real service ran and the call was logged. The
//!   return value is ignored.
//!
//! Fields documented as mutable point at the handler's own copies of the
//! arguments, so a Pre observer may redirect the call (rename the variable,
//! swap the buffer, ...). `succeeded` and `status_message` are outcome
//! fields and are only meaningful on Post.

use core::ffi::{CStr, c_char, c_void};

use r_efi::efi;
use shared::wire::OperationKind;

pub mod registry;

pub use registry::CallbackRegistry;

/// Observer signature, shared with drivers outside this image.
pub type VariableCallback = extern "efiapi" fn(*mut VariableCallbackParameters) -> efi::Boolean;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Pre = 0,
    Post = 1,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct GetParameters {
    pub variable_name: *mut *mut efi::Char16, // mutable
    pub vendor_guid: *mut *mut efi::Guid,     // mutable
    pub attributes: *mut *mut u32,            // mutable; (*attributes) may be null
    pub data_size: *mut *mut usize,           // mutable
    pub data: *mut *mut c_void,               // mutable; (*data) may be null
    pub succeeded: efi::Boolean,
    pub status_message: *const c_char,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SetParameters {
    pub variable_name: *mut *mut efi::Char16, // mutable
    pub vendor_guid: *mut *mut efi::Guid,     // mutable
    pub attributes: *mut u32,                 // mutable
    pub data_size: *mut usize,                // mutable
    pub data: *mut *mut c_void,               // mutable
    pub succeeded: efi::Boolean,
    pub status_message: *const c_char,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union CallbackArguments {
    pub get: GetParameters,
    pub set: SetParameters,
}

/// What an observer receives. `callback_type` selects the union arm.
#[repr(C)]
pub struct VariableCallbackParameters {
    pub callback_type: OperationKind,
    pub operation_type: OperationType,
    pub parameters: CallbackArguments,
}

/// Outcome handed to Post observers.
#[derive(Clone, Copy)]
pub struct Outcome<'a> {
    pub status: efi::Status,
    /// NUL-terminated `%r` text.
    pub message: &'a [u8],
}

fn outcome_fields(outcome: Option<Outcome<'_>>) -> (efi::Boolean, *const c_char) {
    match outcome {
        Some(o) => (efi::Boolean::from(!o.status.is_error()), o.message.as_ptr().cast()),
        None => (efi::Boolean::FALSE, core::ptr::null()),
    }
}

impl VariableCallbackParameters {
    pub fn for_get(
        operation: OperationType,
        variable_name: &mut *mut efi::Char16,
        vendor_guid: &mut *mut efi::Guid,
        attributes: &mut *mut u32,
        data_size: &mut *mut usize,
        data: &mut *mut c_void,
        outcome: Option<Outcome<'_>>,
    ) -> Self {
        let (succeeded, status_message) = outcome_fields(outcome);
        Self {
            callback_type: OperationKind::Get,
            operation_type: operation,
            parameters: CallbackArguments {
                get: GetParameters {
                    variable_name,
                    vendor_guid,
                    attributes,
                    data_size,
                    data,
                    succeeded,
                    status_message,
                },
            },
        }
    }

    pub fn for_set(
        operation: OperationType,
        variable_name: &mut *mut efi::Char16,
        vendor_guid: &mut *mut efi::Guid,
        attributes: &mut u32,
        data_size: &mut usize,
        data: &mut *mut c_void,
        outcome: Option<Outcome<'_>>,
    ) -> Self {
        let (succeeded, status_message) = outcome_fields(outcome);
        Self {
            callback_type: OperationKind::Set,
            operation_type: operation,
            parameters: CallbackArguments {
                set: SetParameters {
                    variable_name,
                    vendor_guid,
                    attributes,
                    data_size,
                    data,
                    succeeded,
                    status_message,
                },
            },
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.callback_type
    }

    pub fn operation(&self) -> OperationType {
        self.operation_type
    }

    fn common(&self) -> (*mut *mut efi::Char16, *mut *mut efi::Guid, efi::Boolean, *const c_char) {
        // SAFETY: `callback_type` tells which arm was written.
        unsafe {
            match self.callback_type {
                OperationKind::Get => {
                    let p = &self.parameters.get;
                    (p.variable_name, p.vendor_guid, p.succeeded, p.status_message)
                }
                OperationKind::Set => {
                    let p = &self.parameters.set;
                    (p.variable_name, p.vendor_guid, p.succeeded, p.status_message)
                }
            }
        }
    }

    pub fn succeeded(&self) -> bool {
        bool::from(self.common().2)
    }

    /// Outcome text on Post, `None` on Pre.
    ///
    /// # Safety
    /// Only valid while the callback is running.
    pub unsafe fn status_message(&self) -> Option<&str> {
        let msg = self.common().3;
        if msg.is_null() {
            return None;
        }
        unsafe { CStr::from_ptr(msg) }.to_str().ok()
    }

    /// Current variable name pointer (possibly rewritten by an earlier
    /// observer).
    ///
    /// # Safety
    /// Only valid while the callback is running.
    pub unsafe fn variable_name(&self) -> *mut efi::Char16 {
        unsafe { *self.common().0 }
    }

    /// # Safety
    /// Only valid while the callback is running.
    pub unsafe fn vendor_guid(&self) -> Option<&efi::Guid> {
        unsafe { (*self.common().1).as_ref() }
    }

    /// Data size as currently seen by the service.
    ///
    /// # Safety
    /// Only valid while the callback is running.
    pub unsafe fn data_size(&self) -> Option<usize> {
        unsafe {
            match self.callback_type {
                OperationKind::Get => (*self.parameters.get.data_size).as_ref().copied(),
                OperationKind::Set => self.parameters.set.data_size.as_ref().copied(),
            }
        }
    }
}
