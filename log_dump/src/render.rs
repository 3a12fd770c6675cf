//! Turning drained bytes into lines.

use std::io::Write;

use anyhow::Context;
use log::{debug, warn};
use serde::Serialize;
use shared::wire::{EntryIter, LogEntry, OperationKind};

use crate::config::{Filter, Format};

/// One entry as it appears in JSON output.
#[derive(Debug, Serialize)]
pub struct EntryRecord {
    pub offset: usize,
    pub operation: &'static str,
    pub name: String,
    pub vendor: String,
    pub attributes: u32,
    pub status: usize,
    pub status_text: String,
    pub data_size: usize,
    /// Payload as lowercase hex.
    pub data: String,
}

impl EntryRecord {
    pub fn from_entry(entry: &LogEntry<'_>) -> Self {
        let h = &entry.header;
        Self {
            offset: entry.offset,
            operation: match h.kind() {
                Some(OperationKind::Get) => "GetVariable",
                Some(OperationKind::Set) => "SetVariable",
                None => "Unknown",
            },
            name: String::from_utf16_lossy(h.name_units()),
            vendor: h.vendor.to_string(),
            attributes: h.attributes,
            status: h.status,
            status_text: h.status_text.as_str().to_owned(),
            data_size: h.payload_len,
            data: hex::encode(entry.payload),
        }
    }
}

/// `G: <vendor> Size=<hex> <name>: <status text>`
pub fn text_line(entry: &LogEntry<'_>) -> String {
    let h = &entry.header;
    format!(
        "{}: {} Size={:08X} {}: {}",
        h.kind().map_or('?', OperationKind::tag),
        h.vendor,
        h.payload_len,
        String::from_utf16_lossy(h.name_units()),
        h.status_text
    )
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub shown: usize,
    pub filtered: usize,
    /// The walk stopped early on a malformed entry.
    pub damaged: bool,
}

/// Print every entry of `buf` that passes `filter`.
pub fn render<W: Write>(buf: &[u8], filter: &Filter, format: Format, out: &mut W) -> anyhow::Result<Summary> {
    let mut summary = Summary::default();
    for item in EntryIter::new(buf) {
        let entry = match item {
            Ok(entry) => entry,
            Err(err) => {
                warn!("stopping: {err}");
                summary.damaged = true;
                break;
            }
        };
        if !filter.matches(&entry.header) {
            summary.filtered += 1;
            continue;
        }

        match format {
            Format::Text => writeln!(out, "{}", text_line(&entry))?,
            Format::Json => {
                serde_json::to_writer(&mut *out, &EntryRecord::from_entry(&entry))
                    .with_context(|| format!("encoding entry at offset {}", entry.offset))?;
                writeln!(out)?;
            }
        }
        summary.shown += 1;
    }
    debug!("{} bytes walked", buf.len());
    Ok(summary)
}
