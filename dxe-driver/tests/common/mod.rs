//! In-memory firmware for driving the monitor from host tests.
//!
//! `MockFirmware` stands in for the system table: two service slots, a TPL
//! that records every raise, page allocations on the heap and an event
//! list. The "real" services behind the slots are `fake_get_variable` /
//! `fake_set_variable`, backed by a process-wide variable store.

#![allow(dead_code)]

use std::alloc::{self, Layout};
use std::ffi::c_void;
use std::mem;
use std::ptr::{self, NonNull};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use r_efi::efi;
use shared::Guid;
use var_monitor::firmware::{Firmware, ServiceSlot};
use var_monitor::helpers::wire_guid;

pub const PAGE: usize = 4096;

pub struct MockFirmware {
    slots: Mutex<[usize; 2]>,
    tpl: AtomicUsize,
    pub raised: Mutex<Vec<efi::Tpl>>,
    pub crc_refreshes: AtomicUsize,
    /// Fail the n-th CRC refresh (1-based); 0 never fails.
    pub fail_crc_on: AtomicUsize,
    pub fail_allocate: Option<efi::Status>,
    pub fail_event: Option<efi::Status>,
    /// Live allocations: (base, pages).
    pub allocations: Mutex<Vec<(usize, usize)>>,
    /// Live events with the notify context they were created with.
    pub events: Mutex<Vec<(usize, efi::EventNotify, usize)>>,
    next_event: AtomicUsize,
    /// Added to every address handed to `convert_pointer`.
    pub convert_offset: usize,
    pub conversions: Mutex<Vec<usize>>,
    /// Fail the n-th pointer conversion (1-based); 0 never fails.
    pub fail_convert_on: AtomicUsize,
}

impl MockFirmware {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new([fake_get_variable as usize, fake_set_variable as usize]),
            tpl: AtomicUsize::new(efi::TPL_APPLICATION),
            raised: Mutex::new(Vec::new()),
            crc_refreshes: AtomicUsize::new(0),
            fail_crc_on: AtomicUsize::new(0),
            fail_allocate: None,
            fail_event: None,
            allocations: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            next_event: AtomicUsize::new(0x1000),
            convert_offset: 0x8000_0000_0000,
            conversions: Mutex::new(Vec::new()),
            fail_convert_on: AtomicUsize::new(0),
        }
    }

    pub fn slot(&self, slot: ServiceSlot) -> usize {
        self.read_slot(slot)
    }

    pub fn tpl(&self) -> efi::Tpl {
        self.tpl.load(Ordering::SeqCst)
    }

    /// Fire the virtual address change notification like the OS would.
    pub fn signal_address_change(&self) {
        let events = self.events.lock().unwrap().clone();
        for (event, notify, context) in events {
            notify(event as efi::Event, context as *mut c_void);
        }
    }

    /// Call whatever GetVariable the table holds right now.
    pub fn get_variable(&self, name: &[u16], vendor: &efi::Guid, data: &mut [u8]) -> (efi::Status, usize, u32) {
        let service: efi::RuntimeGetVariable =
            unsafe { mem::transmute::<usize, efi::RuntimeGetVariable>(self.slot(ServiceSlot::GetVariable)) };
        let mut vendor = *vendor;
        let mut size = data.len();
        let mut attributes = 0u32;
        let data_ptr = if data.is_empty() { ptr::null_mut() } else { data.as_mut_ptr().cast() };
        let status = service(name.as_ptr() as *mut _, &mut vendor, &mut attributes, &mut size, data_ptr);
        (status, size, attributes)
    }

    /// Call whatever SetVariable the table holds right now.
    pub fn set_variable(&self, name: &[u16], vendor: &efi::Guid, attributes: u32, data: &[u8]) -> efi::Status {
        let service: efi::RuntimeSetVariable =
            unsafe { mem::transmute::<usize, efi::RuntimeSetVariable>(self.slot(ServiceSlot::SetVariable)) };
        let mut vendor = *vendor;
        service(name.as_ptr() as *mut _, &mut vendor, attributes, data.len(), data.as_ptr() as *mut c_void)
    }
}

impl Drop for MockFirmware {
    fn drop(&mut self) {
        for (base, pages) in self.allocations.lock().unwrap().drain(..) {
            unsafe { alloc::dealloc(base as *mut u8, layout(pages)) };
        }
    }
}

fn layout(pages: usize) -> Layout {
    Layout::from_size_align(pages * PAGE, PAGE).unwrap()
}

impl Firmware for MockFirmware {
    fn raise_tpl(&self, tpl: efi::Tpl) -> efi::Tpl {
        self.raised.lock().unwrap().push(tpl);
        self.tpl.swap(tpl, Ordering::SeqCst)
    }

    fn restore_tpl(&self, tpl: efi::Tpl) {
        self.tpl.store(tpl, Ordering::SeqCst);
    }

    fn read_slot(&self, slot: ServiceSlot) -> usize {
        self.slots.lock().unwrap()[slot as usize]
    }

    fn write_slot(&self, slot: ServiceSlot, value: usize) {
        self.slots.lock().unwrap()[slot as usize] = value;
    }

    fn refresh_crc32(&self) -> Result<(), efi::Status> {
        let n = self.crc_refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if n == self.fail_crc_on.load(Ordering::SeqCst) {
            return Err(efi::Status::DEVICE_ERROR);
        }
        Ok(())
    }

    fn allocate_runtime_pages(&self, pages: usize) -> Result<NonNull<u8>, efi::Status> {
        if let Some(status) = self.fail_allocate {
            return Err(status);
        }
        let base = NonNull::new(unsafe { alloc::alloc_zeroed(layout(pages)) }).ok_or(efi::Status::OUT_OF_RESOURCES)?;
        self.allocations.lock().unwrap().push((base.as_ptr() as usize, pages));
        Ok(base)
    }

    fn free_pages(&self, base: NonNull<u8>, pages: usize) {
        let addr = base.as_ptr() as usize;
        let mut allocations = self.allocations.lock().unwrap();
        // A relocated base is freed under its converted address.
        let found = allocations
            .iter()
            .position(|&(b, p)| p == pages && (b == addr || b.wrapping_add(self.convert_offset) == addr));
        if let Some(index) = found {
            let (b, p) = allocations.remove(index);
            unsafe { alloc::dealloc(b as *mut u8, layout(p)) };
        }
    }

    fn create_address_change_event(
        &self,
        notify: efi::EventNotify,
        context: *mut c_void,
    ) -> Result<efi::Event, efi::Status> {
        if let Some(status) = self.fail_event {
            return Err(status);
        }
        let event = self.next_event.fetch_add(0x10, Ordering::SeqCst);
        self.events.lock().unwrap().push((event, notify, context as usize));
        Ok(event as efi::Event)
    }

    fn close_event(&self, event: efi::Event) {
        self.events.lock().unwrap().retain(|&(e, _, _)| e != event as usize);
    }

    fn convert_pointer(&self, address: usize) -> Result<usize, efi::Status> {
        let mut conversions = self.conversions.lock().unwrap();
        conversions.push(address);
        if conversions.len() == self.fail_convert_on.load(Ordering::SeqCst) {
            return Err(efi::Status::NOT_FOUND);
        }
        Ok(address.wrapping_add(self.convert_offset))
    }
}

/// UTF-16 with terminator.
pub fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(Some(0)).collect()
}

pub const TEST_VENDOR: efi::Guid = efi::Guid::from_fields(
    0x8be4_df61,
    0x93ca,
    0x11d2,
    0xaa,
    0x0d,
    &[0x00, 0xe0, 0x98, 0x03, 0x2b, 0x8c],
);

struct StoredVariable {
    name: Vec<u16>,
    vendor: Guid,
    attributes: u32,
    data: Vec<u8>,
}

static STORE: Mutex<Vec<StoredVariable>> = Mutex::new(Vec::new());
pub static SERVICE_CALLS: AtomicUsize = AtomicUsize::new(0);

pub fn reset_store() {
    STORE.lock().unwrap().clear();
    SERVICE_CALLS.store(0, Ordering::SeqCst);
}

pub fn stored(name: &str) -> Option<Vec<u8>> {
    let name: Vec<u16> = name.encode_utf16().collect();
    STORE.lock().unwrap().iter().find(|v| v.name == name).map(|v| v.data.clone())
}

unsafe fn name_of(ptr: *const efi::Char16) -> Vec<u16> {
    let mut out = Vec::new();
    let mut i = 0;
    while unsafe { *ptr.add(i) } != 0 {
        out.push(unsafe { *ptr.add(i) });
        i += 1;
    }
    out
}

pub extern "efiapi" fn fake_get_variable(
    name: *mut efi::Char16,
    vendor: *mut efi::Guid,
    attributes: *mut u32,
    data_size: *mut usize,
    data: *mut c_void,
) -> efi::Status {
    SERVICE_CALLS.fetch_add(1, Ordering::SeqCst);
    if name.is_null() || vendor.is_null() || data_size.is_null() {
        return efi::Status::INVALID_PARAMETER;
    }
    let name = unsafe { name_of(name) };
    let vendor = wire_guid(unsafe { &*vendor });
    let store = STORE.lock().unwrap();
    let Some(var) = store.iter().find(|v| v.name == name && v.vendor == vendor) else {
        return efi::Status::NOT_FOUND;
    };
    unsafe {
        if *data_size < var.data.len() {
            *data_size = var.data.len();
            return efi::Status::BUFFER_TOO_SMALL;
        }
        if !var.data.is_empty() {
            ptr::copy_nonoverlapping(var.data.as_ptr(), data.cast::<u8>(), var.data.len());
        }
        *data_size = var.data.len();
        if !attributes.is_null() {
            *attributes = var.attributes;
        }
    }
    efi::Status::SUCCESS
}

pub extern "efiapi" fn fake_set_variable(
    name: *mut efi::Char16,
    vendor: *mut efi::Guid,
    attributes: u32,
    data_size: usize,
    data: *mut c_void,
) -> efi::Status {
    SERVICE_CALLS.fetch_add(1, Ordering::SeqCst);
    if name.is_null() || vendor.is_null() {
        return efi::Status::INVALID_PARAMETER;
    }
    let name = unsafe { name_of(name) };
    let vendor = wire_guid(unsafe { &*vendor });
    let mut store = STORE.lock().unwrap();
    store.retain(|v| !(v.name == name && v.vendor == vendor));
    if data_size == 0 {
        return efi::Status::SUCCESS;
    }
    let bytes = unsafe { std::slice::from_raw_parts(data.cast::<u8>(), data_size) }.to_vec();
    store.push(StoredVariable { name, vendor, attributes, data: bytes });
    efi::Status::SUCCESS
}
