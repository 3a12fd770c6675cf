//! Small conversions between firmware representations and ours.

use core::{fmt, slice};

use r_efi::efi;

/// Borrow a NUL-terminated UTF-16 string, reading at most `max` units.
///
/// # Safety
/// `ptr` must be null or point to readable memory up to the terminator or
/// `max` units, whichever comes first, for the lifetime `'a`.
pub unsafe fn wide_str<'a>(ptr: *const u16, max: usize) -> &'a [u16] {
    if ptr.is_null() {
        return &[];
    }
    let mut len = 0;
    // SAFETY: caller guarantees readability up to the terminator or `max`.
    while len < max && unsafe { *ptr.add(len) } != 0 {
        len += 1;
    }
    unsafe { slice::from_raw_parts(ptr, len) }
}

/// Exact comparison of UTF-16 units against an ASCII command name.
pub fn wide_eq(units: &[u16], ascii: &str) -> bool {
    units.len() == ascii.len() && units.iter().zip(ascii.bytes()).all(|(&u, b)| u == u16::from(b))
}

/// `Display` adapter for UTF-16 without allocating.
pub struct Wide<'a>(pub &'a [u16]);

impl fmt::Display for Wide<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in char::decode_utf16(self.0.iter().copied()) {
            fmt::Write::write_char(f, c.unwrap_or(char::REPLACEMENT_CHARACTER))?;
        }
        Ok(())
    }
}

pub fn wire_guid(guid: &efi::Guid) -> shared::Guid {
    let (d1, d2, d3, hi, lo, node) = guid.as_fields();
    shared::Guid::from_fields(
        d1,
        d2,
        d3,
        [hi, lo, node[0], node[1], node[2], node[3], node[4], node[5]],
    )
}

pub const fn efi_guid(guid: &shared::Guid) -> efi::Guid {
    let d = &guid.data4;
    efi::Guid::from_fields(
        guid.data1,
        guid.data2,
        guid.data3,
        d[0],
        d[1],
        &[d[2], d[3], d[4], d[5], d[6], d[7]],
    )
}
