//! What the monitor needs from the platform it is loaded into.
//!
//! The real implementation sits on top of the UEFI system table
//! (`crate::system_table`); tests provide an in-memory table instead. Nothing above
//! this trait touches a raw table address.

use core::ffi::c_void;
use core::ptr::NonNull;

use r_efi::efi;

/// Entries of the runtime services table the monitor replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceSlot {
    GetVariable,
    SetVariable,
}

impl ServiceSlot {
    pub fn name(self) -> &'static str {
        match self {
            Self::GetVariable => "GetVariable",
            Self::SetVariable => "SetVariable",
        }
    }
}

pub trait Firmware {
    fn raise_tpl(&self, tpl: efi::Tpl) -> efi::Tpl;
    fn restore_tpl(&self, tpl: efi::Tpl);

    /// Current function pointer in `slot`, as an address.
    fn read_slot(&self, slot: ServiceSlot) -> usize;
    fn write_slot(&self, slot: ServiceSlot, value: usize);
    /// Recompute the table header checksum after a slot changed.
    fn refresh_crc32(&self) -> Result<(), efi::Status>;

    /// Pages that stay mapped after the switch to virtual addressing.
    fn allocate_runtime_pages(&self, pages: usize) -> Result<NonNull<u8>, efi::Status>;
    fn free_pages(&self, base: NonNull<u8>, pages: usize);

    /// Register `notify` for the virtual address change event group.
    fn create_address_change_event(
        &self,
        notify: efi::EventNotify,
        context: *mut c_void,
    ) -> Result<efi::Event, efi::Status>;
    fn close_event(&self, event: efi::Event);

    /// Translate a physical-mode address into its virtual-mode form. Only
    /// valid from inside the address change notification.
    fn convert_pointer(&self, address: usize) -> Result<usize, efi::Status>;
}
