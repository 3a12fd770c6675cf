//! Append-only log of variable service calls in runtime memory.
//!
//!   ┌──── 0                                   capacity (256 KiB) ────┐
//!   │ entry │ pad │ entry │ pad │ …           cursor ▸   zeroed      │
//!   └────────────────────────────────────────────────────────────────┘
//!
//! * Entries are laid out as `shared::wire` describes and start on a
//!   16-byte boundary.
//! * When an entry does not fit it is dropped; retained entries are never
//!   overwritten. Logging must not make a variable service fail.
//! * A drain moves everything out and rewinds the cursor to zero.

use core::ptr::NonNull;
use core::slice;

use log::{debug, trace};
use shared::wire::{EntryHeader, HEADER_SIZE, OperationKind};
use shared::Guid;

use crate::error::MonitorError;
use crate::firmware::Firmware;
use crate::helpers::Wide;
use crate::sync::{InterruptLevel, PlatformLevel, PriorityLock};

struct RingState {
    base: Option<NonNull<u8>>,
    capacity: usize,
    cursor: usize,
}

// SAFETY: the region is only touched with the ring lock held.
unsafe impl Send for RingState {}

impl RingState {
    fn bytes(&mut self) -> &mut [u8] {
        match self.base {
            // SAFETY: `attach` guarantees exclusive access to `capacity` bytes.
            Some(base) => unsafe { slice::from_raw_parts_mut(base.as_ptr(), self.capacity) },
            None => &mut [],
        }
    }
}

pub struct LogRing<L: InterruptLevel = PlatformLevel> {
    state: PriorityLock<RingState, L>,
}

impl<L: InterruptLevel> LogRing<L> {
    /// A ring without backing memory; appends are dropped until `attach`.
    pub const fn new() -> Self {
        Self { state: PriorityLock::new(RingState { base: None, capacity: 0, cursor: 0 }) }
    }

    /// Hand the ring `capacity` bytes at `base`, zeroing them.
    ///
    /// # Safety
    /// `base` must be valid for reads and writes of `capacity` bytes and
    /// must not be accessed by anything else until [`detach`](Self::detach).
    pub unsafe fn attach(&self, base: NonNull<u8>, capacity: usize) {
        let mut st = self.state.lock();
        st.base = Some(base);
        st.capacity = capacity;
        st.cursor = 0;
        st.bytes().fill(0);
    }

    /// Take the backing memory back. Buffered entries are discarded.
    pub fn detach(&self) -> Option<(NonNull<u8>, usize)> {
        let mut st = self.state.lock();
        let capacity = st.capacity;
        st.capacity = 0;
        st.cursor = 0;
        st.base.take().map(|base| (base, capacity))
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.state.lock().cursor
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record one service call. Returns `false` if the entry was dropped
    /// for lack of room.
    pub fn append(
        &self,
        kind: OperationKind,
        name: &[u16],
        vendor: Guid,
        attributes: u32,
        status: usize,
        payload: &[u8],
    ) -> bool {
        let header = EntryHeader::new(kind, name, vendor, attributes, status, payload.len());

        let stored = {
            let mut st = self.state.lock();
            let cursor = st.cursor;
            match header.entry_size() {
                Some(size) if size <= st.capacity - cursor => {
                    let entry = &mut st.bytes()[cursor..cursor + size];
                    header.write_to(entry);
                    entry[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);
                    st.cursor = cursor + size;
                    true
                }
                _ => false,
            }
        };

        trace!(
            "{}: {} Size={:08x} {}: {}",
            kind.tag(),
            vendor,
            payload.len(),
            Wide(header.name_units()),
            header.status_text
        );
        stored
    }

    /// Move every buffered byte into `dest` and rewind.
    ///
    /// `dest` must be able to take the whole ring, not just what is
    /// buffered right now; otherwise nothing changes and the capacity is
    /// reported back.
    pub fn drain_into(&self, dest: &mut [u8]) -> Result<usize, MonitorError> {
        let mut st = self.state.lock();
        if dest.len() < st.capacity {
            return Err(MonitorError::BufferTooSmall { required: st.capacity });
        }
        let used = st.cursor;
        let bytes = st.bytes();
        dest[..used].copy_from_slice(&bytes[..used]);
        bytes[..used].fill(0);
        st.cursor = 0;
        Ok(used)
    }

    /// Translate the backing address for virtual addressing.
    pub fn relocate(&self, fw: &dyn Firmware) -> Result<(), MonitorError> {
        let mut st = self.state.lock();
        let Some(base) = st.base else {
            return Ok(());
        };
        let current = base.as_ptr() as usize;
        let relocated = fw.convert_pointer(current).map_err(MonitorError::Firmware)?;
        st.base = NonNull::new(relocated as *mut u8);
        debug!("log buffer relocated from {:#x} to {:#x}", current, relocated);
        Ok(())
    }
}

impl<L: InterruptLevel> Default for LogRing<L> {
    fn default() -> Self {
        Self::new()
    }
}
