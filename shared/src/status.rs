//! Firmware status codes as they appear on the wire, and their `%r` text.
//!
//! The log stores the raw platform-width code; consumers without the
//! firmware headers at hand still want to print something readable, so the
//! text table lives here rather than in the driver.

use core::fmt::{self, Write};

use crate::constants::STATUS_TEXT_LEN;

pub const ERROR_BIT: usize = 1 << (usize::BITS - 1);

pub const SUCCESS: usize = 0;
pub const INVALID_PARAMETER: usize = ERROR_BIT | 2;
pub const UNSUPPORTED: usize = ERROR_BIT | 3;
pub const BUFFER_TOO_SMALL: usize = ERROR_BIT | 5;
pub const OUT_OF_RESOURCES: usize = ERROR_BIT | 9;
pub const NOT_FOUND: usize = ERROR_BIT | 14;
pub const ACCESS_DENIED: usize = ERROR_BIT | 15;

#[inline]
pub const fn is_error(code: usize) -> bool {
    code & ERROR_BIT != 0
}

const ERRORS: [&str; 36] = [
    "Success",
    "Load Error",
    "Invalid Parameter",
    "Unsupported",
    "Bad Buffer Size",
    "Buffer Too Small",
    "Not Ready",
    "Device Error",
    "Write Protected",
    "Out of Resources",
    "Volume Corrupt",
    "Volume Full",
    "No Media",
    "Media changed",
    "Not Found",
    "Access Denied",
    "No Response",
    "No mapping",
    "Time out",
    "Not started",
    "Already started",
    "Aborted",
    "ICMP Error",
    "TFTP Error",
    "Protocol Error",
    "Incompatible Version",
    "Security Violation",
    "CRC Error",
    "End of Media",
    "Reserved (29)",
    "Reserved (30)",
    "End of File",
    "Invalid Language",
    "Compromised Data",
    "IP Address Conflict",
    "HTTP Error",
];

const WARNINGS: [&str; 8] = [
    "Success",
    "Warning Unknown Glyph",
    "Warning Delete Failure",
    "Warning Write Failure",
    "Warning Buffer Too Small",
    "Warning Stale Data",
    "Warning File System",
    "Warning Reset Required",
];

/// Known text for `code`, if any.
pub fn describe(code: usize) -> Option<&'static str> {
    let index = code & !ERROR_BIT;
    if is_error(code) {
        // index 0 under the error bit is not a defined code
        (index != 0).then(|| ERRORS.get(index).copied()).flatten()
    } else {
        WARNINGS.get(index).copied()
    }
}

/// Fixed 32-byte, NUL-terminated status text as stored in a log entry.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct StatusText {
    buf: [u8; STATUS_TEXT_LEN],
    len: usize,
}

impl StatusText {
    pub const fn empty() -> Self {
        Self { buf: [0; STATUS_TEXT_LEN], len: 0 }
    }

    pub fn for_status(code: usize) -> Self {
        let mut text = Self::empty();
        // truncation is the only failure and is handled by write_str
        let _ = match describe(code) {
            Some(s) => text.write_str(s),
            None => write!(text, "Unknown ({code:#x})"),
        };
        text
    }

    /// Reads the stored field back, stopping at the first NUL.
    pub fn from_field(raw: &[u8; STATUS_TEXT_LEN]) -> Self {
        let len = raw.iter().position(|&b| b == 0).unwrap_or(STATUS_TEXT_LEN - 1);
        let mut buf = [0u8; STATUS_TEXT_LEN];
        buf[..len].copy_from_slice(&raw[..len]);
        Self { buf, len }
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }

    /// The NUL-terminated field.
    pub fn as_field(&self) -> &[u8; STATUS_TEXT_LEN] {
        &self.buf
    }
}

impl Write for StatusText {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // keep one byte for the terminator
        let room = STATUS_TEXT_LEN - 1 - self.len;
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() { Err(fmt::Error) } else { Ok(()) }
    }
}

impl fmt::Debug for StatusText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for StatusText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_use_firmware_wording() {
        assert_eq!(StatusText::for_status(SUCCESS).as_str(), "Success");
        assert_eq!(StatusText::for_status(NOT_FOUND).as_str(), "Not Found");
        assert_eq!(StatusText::for_status(ACCESS_DENIED).as_str(), "Access Denied");
        assert_eq!(StatusText::for_status(4).as_str(), "Warning Buffer Too Small");
    }

    #[test]
    fn unknown_codes_fit_and_stay_terminated() {
        let text = StatusText::for_status(ERROR_BIT | 0x7777);
        assert!(text.as_str().starts_with("Unknown (0x"));
        assert!(text.as_str().len() < STATUS_TEXT_LEN);
        assert_eq!(text.as_field()[STATUS_TEXT_LEN - 1], 0);
    }

    #[test]
    fn field_roundtrip_stops_at_nul() {
        let text = StatusText::for_status(BUFFER_TOO_SMALL);
        let back = StatusText::from_field(text.as_field());
        assert_eq!(back, text);
    }
}
