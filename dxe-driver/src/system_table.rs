//! [`Firmware`] on top of the live UEFI system table.

use core::ffi::c_void;
use core::ptr::{self, NonNull};

use r_efi::efi;
use r_efi::protocols::loaded_image;

use crate::firmware::{Firmware, ServiceSlot};

/// Wraps the system table handed to the image entry point.
///
/// Boot services are only touched at boot time; after ExitBootServices the
/// monitor only ever calls `convert_pointer`, which lives in the runtime
/// table.
pub struct SystemTableFirmware {
    st: NonNull<efi::SystemTable>,
}

impl SystemTableFirmware {
    /// # Safety
    /// `st` must be the system table passed to the image entry point.
    pub unsafe fn new(st: *mut efi::SystemTable) -> Option<Self> {
        NonNull::new(st).map(|st| Self { st })
    }

    fn st(&self) -> &efi::SystemTable {
        unsafe { self.st.as_ref() }
    }

    fn rt(&self) -> *mut efi::RuntimeServices {
        self.st().runtime_services
    }

    fn bs(&self) -> &efi::BootServices {
        unsafe { &*self.st().boot_services }
    }

    fn crc32_of(&self, hdr: *mut efi::TableHeader) -> Result<(), efi::Status> {
        // SAFETY: `hdr` heads a firmware table of `header_size` bytes.
        unsafe {
            (*hdr).crc32 = 0;
            let mut crc = 0u32;
            let size = (*hdr).header_size as usize;
            let status = (self.bs().calculate_crc32)(hdr.cast(), size, &mut crc);
            if status.is_error() {
                return Err(status);
            }
            (*hdr).crc32 = crc;
        }
        Ok(())
    }
}

impl Firmware for SystemTableFirmware {
    fn raise_tpl(&self, tpl: efi::Tpl) -> efi::Tpl {
        (self.bs().raise_tpl)(tpl)
    }

    fn restore_tpl(&self, tpl: efi::Tpl) {
        (self.bs().restore_tpl)(tpl)
    }

    fn read_slot(&self, slot: ServiceSlot) -> usize {
        let rt = self.rt();
        // SAFETY: the runtime table is valid for the life of the image.
        unsafe {
            match slot {
                ServiceSlot::GetVariable => (*rt).get_variable as usize,
                ServiceSlot::SetVariable => (*rt).set_variable as usize,
            }
        }
    }

    fn write_slot(&self, slot: ServiceSlot, value: usize) {
        let rt = self.rt();
        // SAFETY: `value` is a service of the matching signature; callers
        // hold TPL_HIGH_LEVEL.
        unsafe {
            match slot {
                ServiceSlot::GetVariable => {
                    (*rt).get_variable = core::mem::transmute::<usize, efi::RuntimeGetVariable>(value)
                }
                ServiceSlot::SetVariable => {
                    (*rt).set_variable = core::mem::transmute::<usize, efi::RuntimeSetVariable>(value)
                }
            }
        }
    }

    fn refresh_crc32(&self) -> Result<(), efi::Status> {
        let rt = self.rt();
        self.crc32_of(unsafe { ptr::addr_of_mut!((*rt).hdr) })?;
        let st = self.st.as_ptr();
        self.crc32_of(unsafe { ptr::addr_of_mut!((*st).hdr) })
    }

    fn allocate_runtime_pages(&self, pages: usize) -> Result<NonNull<u8>, efi::Status> {
        let mut address: efi::PhysicalAddress = 0;
        let status = (self.bs().allocate_pages)(
            efi::ALLOCATE_ANY_PAGES,
            efi::RUNTIME_SERVICES_DATA,
            pages,
            &mut address,
        );
        if status.is_error() {
            return Err(status);
        }
        NonNull::new(address as usize as *mut u8).ok_or(efi::Status::OUT_OF_RESOURCES)
    }

    fn free_pages(&self, base: NonNull<u8>, pages: usize) {
        let _ = (self.bs().free_pages)(base.as_ptr() as usize as efi::PhysicalAddress, pages);
    }

    fn create_address_change_event(
        &self,
        notify: efi::EventNotify,
        context: *mut c_void,
    ) -> Result<efi::Event, efi::Status> {
        let mut event: efi::Event = ptr::null_mut();
        let status = (self.bs().create_event_ex)(
            efi::EVT_NOTIFY_SIGNAL,
            efi::TPL_CALLBACK,
            Some(notify),
            context,
            &efi::EVENT_GROUP_VIRTUAL_ADDRESS_CHANGE,
            &mut event,
        );
        if status.is_error() {
            return Err(status);
        }
        Ok(event)
    }

    fn close_event(&self, event: efi::Event) {
        let _ = (self.bs().close_event)(event);
    }

    fn convert_pointer(&self, address: usize) -> Result<usize, efi::Status> {
        let mut converted = address as *mut c_void;
        // SAFETY: runtime table stays valid; ConvertPointer only rewrites
        // `converted`.
        let status = unsafe { ((*self.rt()).convert_pointer)(0, &mut converted) };
        if status.is_error() {
            return Err(status);
        }
        Ok(converted as usize)
    }
}

impl SystemTableFirmware {
    /// Hook `unload` into the image's loaded-image protocol so the driver
    /// can be unloaded before ExitBootServices.
    pub fn register_unload(&self, image: efi::Handle, unload: efi::ImageUnload) -> Result<(), efi::Status> {
        let mut interface: *mut c_void = ptr::null_mut();
        let mut guid = loaded_image::PROTOCOL_GUID;
        let status = (self.bs().handle_protocol)(image, &mut guid, &mut interface);
        if status.is_error() {
            return Err(status);
        }
        let protocol = interface.cast::<loaded_image::Protocol>();
        if protocol.is_null() {
            return Err(efi::Status::NOT_FOUND);
        }
        // SAFETY: the protocol instance belongs to our own image.
        unsafe { (*protocol).unload = Some(unload) };
        Ok(())
    }
}
