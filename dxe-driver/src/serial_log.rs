//! `log` backend that writes one line per record to a byte sink.
//!
//! On x86-64 the sink is COM1, which keeps working after the OS has taken
//! over because it needs no mapping. Formatting happens on the stack; a
//! record longer than [`LOG_LINE_MAX`] is cut.

use core::fmt::{self, Write};

use log::{Log, Metadata, Record};

use crate::consts::{LOG_LEVEL, LOG_LINE_MAX};

pub trait ByteSink {
    fn write_bytes(&self, bytes: &[u8]);
}

/// 16550 UART at the legacy COM1 address.
#[cfg(all(target_arch = "x86_64", target_os = "uefi"))]
pub struct Com1;

#[cfg(all(target_arch = "x86_64", target_os = "uefi"))]
impl Com1 {
    const PORT: u16 = 0x3F8;
    const LINE_STATUS: u16 = Self::PORT + 5;
    const THR_EMPTY: u8 = 0x20;

    unsafe fn outb(port: u16, value: u8) {
        unsafe { core::arch::asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack, preserves_flags)) };
    }

    unsafe fn inb(port: u16) -> u8 {
        let value: u8;
        unsafe { core::arch::asm!("in al, dx", in("dx") port, out("al") value, options(nomem, nostack, preserves_flags)) };
        value
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "uefi"))]
impl ByteSink for Com1 {
    fn write_bytes(&self, bytes: &[u8]) {
        for &byte in bytes {
            // SAFETY: COM1 is owned by firmware and left programmed.
            unsafe {
                while Self::inb(Self::LINE_STATUS) & Self::THR_EMPTY == 0 {
                    core::hint::spin_loop();
                }
                Self::outb(Self::PORT, byte);
            }
        }
    }
}

/// Fixed-size line that silently drops what does not fit.
struct Line {
    buf: [u8; LOG_LINE_MAX],
    len: usize,
}

impl Line {
    const fn new() -> Self {
        Self { buf: [0; LOG_LINE_MAX], len: 0 }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Write for Line {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        // Keep two bytes for the CRLF.
        let room = LOG_LINE_MAX - 2 - self.len;
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

pub struct SerialLogger<S> {
    sink: S,
}

impl<S: ByteSink> SerialLogger<S> {
    pub const fn new(sink: S) -> Self {
        Self { sink }
    }
}

impl<S: ByteSink + Sync + Send> Log for SerialLogger<S> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= LOG_LEVEL
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut line = Line::new();
        let _ = write!(line, "[{} {}] {}", record.level(), record.target(), record.args());
        line.buf[line.len..line.len + 2].copy_from_slice(b"\r\n");
        line.len += 2;
        self.sink.write_bytes(line.as_bytes());
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Capture(Mutex<Vec<u8>>);

    impl ByteSink for Capture {
        fn write_bytes(&self, bytes: &[u8]) {
            self.0.lock().unwrap().extend_from_slice(bytes);
        }
    }

    fn emit(logger: &SerialLogger<Capture>, level: log::Level, msg: &str) {
        logger.log(
            &Record::builder()
                .level(level)
                .target("var_monitor")
                .args(format_args!("{msg}"))
                .build(),
        );
    }

    #[test]
    fn formats_level_target_and_crlf() {
        let logger = SerialLogger::new(Capture(Mutex::new(Vec::new())));
        emit(&logger, log::Level::Info, "Driver being loaded");
        let out = logger.sink.0.lock().unwrap().clone();
        assert_eq!(out, b"[INFO var_monitor] Driver being loaded\r\n");
    }

    #[test]
    fn long_records_are_cut_but_terminated() {
        let logger = SerialLogger::new(Capture(Mutex::new(Vec::new())));
        let long = "x".repeat(LOG_LINE_MAX * 2);
        emit(&logger, log::Level::Error, &long);
        let out = logger.sink.0.lock().unwrap().clone();
        assert_eq!(out.len(), LOG_LINE_MAX);
        assert!(out.ends_with(b"\r\n"));
    }

    #[test]
    fn trace_is_filtered() {
        let logger = SerialLogger::new(Capture(Mutex::new(Vec::new())));
        emit(&logger, log::Level::Trace, "noise");
        assert!(logger.sink.0.lock().unwrap().is_empty());
    }
}
