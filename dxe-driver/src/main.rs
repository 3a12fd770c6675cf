//! UEFI image entry for the variable monitor.
//!
//! Everything the hooks need lives in one static [`InterceptState`]; the
//! entry point and the unload routine only set it up and tear it down.

#![cfg_attr(target_os = "uefi", no_std)]
#![cfg_attr(target_os = "uefi", no_main)]

#[cfg(target_os = "uefi")]
mod image {
    use core::ffi::c_void;
    use core::ptr;
    use core::sync::atomic::{AtomicPtr, Ordering};

    use log::{error, info};
    use r_efi::efi;
    use var_monitor::system_table::SystemTableFirmware;
    use var_monitor::{Handlers, InterceptState};

    static STATE: InterceptState = InterceptState::new();
    /// Physical system table; cleared once the OS switches to virtual mode.
    static SYSTEM_TABLE: AtomicPtr<efi::SystemTable> = AtomicPtr::new(ptr::null_mut());

    #[cfg(target_arch = "x86_64")]
    static LOGGER: var_monitor::serial_log::SerialLogger<var_monitor::serial_log::Com1> =
        var_monitor::serial_log::SerialLogger::new(var_monitor::serial_log::Com1);

    fn firmware() -> Option<SystemTableFirmware> {
        // SAFETY: only ever holds the table passed to `efi_main`.
        unsafe { SystemTableFirmware::new(SYSTEM_TABLE.load(Ordering::Acquire)) }
    }

    extern "efiapi" fn get_variable(
        name: *mut efi::Char16,
        vendor: *mut efi::Guid,
        attributes: *mut u32,
        data_size: *mut usize,
        data: *mut c_void,
    ) -> efi::Status {
        // SAFETY: called by firmware clients under the GetVariable contract.
        unsafe { STATE.get_variable(name, vendor, attributes, data_size, data) }
    }

    extern "efiapi" fn set_variable(
        name: *mut efi::Char16,
        vendor: *mut efi::Guid,
        attributes: u32,
        data_size: usize,
        data: *mut c_void,
    ) -> efi::Status {
        // SAFETY: called by firmware clients under the SetVariable contract.
        unsafe { STATE.set_variable(name, vendor, attributes, data_size, data) }
    }

    extern "efiapi" fn on_address_change(_event: efi::Event, _context: *mut c_void) {
        let Some(fw) = firmware() else {
            return;
        };
        if let Err(err) = STATE.relocate(&fw) {
            error!("relocation failed : {}", err);
        }
        SYSTEM_TABLE.store(ptr::null_mut(), Ordering::Release);
    }

    extern "efiapi" fn unload(_image: efi::Handle) -> efi::Status {
        let Some(fw) = firmware() else {
            return efi::Status::UNSUPPORTED;
        };
        info!("Driver unloading");
        STATE.teardown(&fw);
        efi::Status::SUCCESS
    }

    #[unsafe(export_name = "efi_main")]
    pub extern "efiapi" fn efi_main(image: efi::Handle, st: *mut efi::SystemTable) -> efi::Status {
        #[cfg(target_arch = "x86_64")]
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(var_monitor::consts::LOG_LEVEL);
        }

        // SAFETY: `st` comes straight from the image loader.
        let Some(fw) = (unsafe { SystemTableFirmware::new(st) }) else {
            return efi::Status::INVALID_PARAMETER;
        };
        SYSTEM_TABLE.store(st, Ordering::Release);

        let handlers = Handlers { get_variable, set_variable, address_change: on_address_change };
        if let Err(err) = STATE.init(&fw, &handlers) {
            return err.into();
        }

        // Without an unload routine the driver simply stays resident.
        if let Err(status) = fw.register_unload(image, unload) {
            error!("registering unload failed : {:#x}", status.as_usize());
        }
        info!("Driver loaded");
        efi::Status::SUCCESS
    }

    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo<'_>) -> ! {
        error!("{}", info);
        loop {
            core::hint::spin_loop();
        }
    }
}

#[cfg(not(target_os = "uefi"))]
fn main() {
    eprintln!("var-monitor-dxe is a UEFI runtime driver; build it with --target x86_64-unknown-uefi");
}
