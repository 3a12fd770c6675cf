//! Log entry layout as handed out by `DrainBuffer`.
//!
//! ```text
//!   0  name           64 x u16, NUL terminated
//! 128  vendor         16 bytes
//! 144  kind           u32   (0 = Get, 1 = Set)
//! 148  attributes     u32
//! 152  status         usize
//!  ..  status text    32 bytes, NUL terminated
//!  ..  payload_len    usize
//!  ..  payload        payload_len bytes, then padding to 16
//! ```
//!
//! Integers are in native byte order; producer and consumer run on the same
//! machine. A drained buffer is a plain concatenation of entries.

use core::mem::size_of;

use thiserror::Error;

use crate::constants::{ENTRY_ALIGNMENT, NAME_CAPACITY, STATUS_TEXT_LEN};
use crate::guid::Guid;
use crate::status::StatusText;

const WORD: usize = size_of::<usize>();

pub const NAME_OFFSET: usize = 0;
pub const VENDOR_OFFSET: usize = NAME_OFFSET + NAME_CAPACITY * 2;
pub const KIND_OFFSET: usize = VENDOR_OFFSET + 16;
pub const ATTRIBUTES_OFFSET: usize = KIND_OFFSET + 4;
pub const STATUS_OFFSET: usize = ATTRIBUTES_OFFSET + 4;
pub const STATUS_TEXT_OFFSET: usize = STATUS_OFFSET + WORD;
pub const PAYLOAD_LEN_OFFSET: usize = STATUS_TEXT_OFFSET + STATUS_TEXT_LEN;
pub const HEADER_SIZE: usize = PAYLOAD_LEN_OFFSET + WORD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("entry header at offset {offset} is truncated")]
    Truncated { offset: usize },
    #[error("entry at offset {offset} is not 16-byte aligned")]
    Misaligned { offset: usize },
    #[error("payload of {len} bytes at offset {offset} runs past the buffer")]
    PayloadOverrun { offset: usize, len: usize },
}

#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Bytes an entry with `payload_len` bytes of data occupies in the buffer,
/// or `None` if the size does not fit in a `usize`.
pub fn entry_size(payload_len: usize) -> Option<usize> {
    HEADER_SIZE
        .checked_add(payload_len)?
        .checked_add(ENTRY_ALIGNMENT - 1)
        .map(|n| n & !(ENTRY_ALIGNMENT - 1))
}

/// Which service produced the entry.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Get = 0,
    Set = 1,
}

impl OperationKind {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Get),
            1 => Some(Self::Set),
            _ => None,
        }
    }

    /// One-letter tag used in text output.
    pub fn tag(self) -> char {
        match self {
            Self::Get => 'G',
            Self::Set => 'S',
        }
    }
}

/// Fixed-size part of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub name: [u16; NAME_CAPACITY],
    pub vendor: Guid,
    pub kind: u32,
    pub attributes: u32,
    pub status: usize,
    pub status_text: StatusText,
    pub payload_len: usize,
}

impl EntryHeader {
    /// Builds a header, truncating `name` to 63 units plus terminator.
    pub fn new(
        kind: OperationKind,
        name: &[u16],
        vendor: Guid,
        attributes: u32,
        status: usize,
        payload_len: usize,
    ) -> Self {
        let mut field = [0u16; NAME_CAPACITY];
        for (dst, &src) in field[..NAME_CAPACITY - 1]
            .iter_mut()
            .zip(name.iter().take_while(|&&c| c != 0))
        {
            *dst = src;
        }
        Self {
            name: field,
            vendor,
            kind: kind as u32,
            attributes,
            status,
            status_text: StatusText::for_status(status),
            payload_len,
        }
    }

    pub fn kind(&self) -> Option<OperationKind> {
        OperationKind::from_raw(self.kind)
    }

    /// Name units up to the terminator.
    pub fn name_units(&self) -> &[u16] {
        let end = self.name.iter().position(|&c| c == 0).unwrap_or(NAME_CAPACITY);
        &self.name[..end]
    }

    /// Aligned size of the whole entry this header describes.
    pub fn entry_size(&self) -> Option<usize> {
        entry_size(self.payload_len)
    }

    /// Serializes into the first `HEADER_SIZE` bytes of `out`.
    ///
    /// # Panics
    /// If `out` is shorter than `HEADER_SIZE`.
    pub fn write_to(&self, out: &mut [u8]) {
        let out = &mut out[..HEADER_SIZE];
        for (chunk, unit) in out[NAME_OFFSET..VENDOR_OFFSET]
            .chunks_exact_mut(2)
            .zip(self.name.iter())
        {
            chunk.copy_from_slice(&unit.to_ne_bytes());
        }
        out[VENDOR_OFFSET..KIND_OFFSET].copy_from_slice(&self.vendor.to_bytes());
        out[KIND_OFFSET..ATTRIBUTES_OFFSET].copy_from_slice(&self.kind.to_ne_bytes());
        out[ATTRIBUTES_OFFSET..STATUS_OFFSET].copy_from_slice(&self.attributes.to_ne_bytes());
        out[STATUS_OFFSET..STATUS_TEXT_OFFSET].copy_from_slice(&self.status.to_ne_bytes());
        out[STATUS_TEXT_OFFSET..PAYLOAD_LEN_OFFSET].copy_from_slice(self.status_text.as_field());
        out[PAYLOAD_LEN_OFFSET..HEADER_SIZE].copy_from_slice(&self.payload_len.to_ne_bytes());
    }

    /// Parses a header from the start of `bytes`.
    pub fn read_from(bytes: &[u8]) -> Option<Self> {
        let raw = bytes.get(..HEADER_SIZE)?;

        let mut name = [0u16; NAME_CAPACITY];
        for (unit, chunk) in name.iter_mut().zip(raw[NAME_OFFSET..VENDOR_OFFSET].chunks_exact(2)) {
            *unit = u16::from_ne_bytes([chunk[0], chunk[1]]);
        }
        let vendor: [u8; 16] = raw[VENDOR_OFFSET..KIND_OFFSET].try_into().ok()?;
        let text: [u8; STATUS_TEXT_LEN] = raw[STATUS_TEXT_OFFSET..PAYLOAD_LEN_OFFSET].try_into().ok()?;

        Some(Self {
            name,
            vendor: Guid::from_bytes(&vendor),
            kind: u32::from_ne_bytes(raw[KIND_OFFSET..ATTRIBUTES_OFFSET].try_into().ok()?),
            attributes: u32::from_ne_bytes(raw[ATTRIBUTES_OFFSET..STATUS_OFFSET].try_into().ok()?),
            status: usize::from_ne_bytes(raw[STATUS_OFFSET..STATUS_TEXT_OFFSET].try_into().ok()?),
            status_text: StatusText::from_field(&text),
            payload_len: usize::from_ne_bytes(raw[PAYLOAD_LEN_OFFSET..HEADER_SIZE].try_into().ok()?),
        })
    }
}

/// A decoded entry: header plus the payload bytes that followed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry<'a> {
    pub offset: usize,
    pub header: EntryHeader,
    pub payload: &'a [u8],
}

/// Walks a drained buffer entry by entry.
pub struct EntryIter<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> EntryIter<'a> {
    /// `buf` must be exactly the bytes reported by the drain.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0, failed: false }
    }
}

impl<'a> Iterator for EntryIter<'a> {
    type Item = Result<LogEntry<'a>, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }
        let offset = self.offset;
        if offset % ENTRY_ALIGNMENT != 0 {
            self.failed = true;
            return Some(Err(WireError::Misaligned { offset }));
        }
        let Some(header) = EntryHeader::read_from(&self.buf[offset..]) else {
            self.failed = true;
            return Some(Err(WireError::Truncated { offset }));
        };

        let start = offset + HEADER_SIZE;
        let payload = start
            .checked_add(header.payload_len)
            .and_then(|end| self.buf.get(start..end));
        let (Some(payload), Some(size)) = (payload, header.entry_size()) else {
            self.failed = true;
            return Some(Err(WireError::PayloadOverrun { offset, len: header.payload_len }));
        };

        self.offset = offset + size;
        Some(Ok(LogEntry { offset, header, payload }))
    }
}
