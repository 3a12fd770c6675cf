//! Pins the drained-buffer layout that consumers outside this workspace
//! parse with their own struct definitions.

use shared::constants::{BACKDOOR_GUID, ENTRY_ALIGNMENT};
use shared::status;
use shared::wire::{self, EntryHeader, EntryIter, OperationKind, HEADER_SIZE};
use shared::Guid;

fn utf16(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn push_entry(buf: &mut Vec<u8>, header: &EntryHeader, payload: &[u8]) {
    let start = buf.len();
    let size = header.entry_size().unwrap();
    buf.resize(start + size, 0);
    header.write_to(&mut buf[start..]);
    buf[start + HEADER_SIZE..start + HEADER_SIZE + payload.len()].copy_from_slice(payload);
}

#[test]
fn header_offsets_follow_the_c_struct() {
    assert_eq!(wire::VENDOR_OFFSET, 128);
    assert_eq!(wire::KIND_OFFSET, 144);
    assert_eq!(wire::ATTRIBUTES_OFFSET, 148);
    assert_eq!(wire::STATUS_OFFSET, 152);
    #[cfg(target_pointer_width = "64")]
    assert_eq!(HEADER_SIZE, 200);
    #[cfg(target_pointer_width = "32")]
    assert_eq!(HEADER_SIZE, 192);
}

#[test]
fn header_fields_land_at_their_offsets() {
    let h = EntryHeader::new(
        OperationKind::Set,
        &utf16("Boot0001"),
        BACKDOOR_GUID,
        0x7,
        status::NOT_FOUND,
        3,
    );
    let mut raw = vec![0u8; HEADER_SIZE];
    h.write_to(&mut raw);

    assert_eq!(&raw[0..2], &u16::from(b'B').to_ne_bytes());
    assert_eq!(&raw[wire::VENDOR_OFFSET..wire::KIND_OFFSET], &BACKDOOR_GUID.to_bytes());
    assert_eq!(&raw[wire::KIND_OFFSET..wire::ATTRIBUTES_OFFSET], &1u32.to_ne_bytes());
    assert_eq!(&raw[wire::ATTRIBUTES_OFFSET..wire::STATUS_OFFSET], &7u32.to_ne_bytes());
    assert_eq!(
        &raw[wire::STATUS_TEXT_OFFSET..wire::STATUS_TEXT_OFFSET + 9],
        b"Not Found"
    );
    assert_eq!(&raw[wire::PAYLOAD_LEN_OFFSET..HEADER_SIZE], &3usize.to_ne_bytes());
}

#[test]
fn walker_visits_entries_in_order() {
    let vendor = Guid::from_fields(0x8be4_df61, 0x93ca, 0x11d2, [0xaa, 0x0d, 0x00, 0xe0, 0x98, 0x03, 0x2b, 0x8c]);
    let mut buf = Vec::new();
    push_entry(
        &mut buf,
        &EntryHeader::new(OperationKind::Get, &utf16("TestVar"), vendor, 6, status::SUCCESS, 4),
        &[1, 2, 3, 4],
    );
    push_entry(
        &mut buf,
        &EntryHeader::new(OperationKind::Set, &utf16("Other"), vendor, 7, status::ACCESS_DENIED, 0),
        &[],
    );

    let entries: Vec<_> = EntryIter::new(&buf).collect::<Result<_, _>>().unwrap();
    assert_eq!(entries.len(), 2);

    assert_eq!(entries[0].offset, 0);
    assert_eq!(entries[0].header.kind(), Some(OperationKind::Get));
    assert_eq!(String::from_utf16_lossy(entries[0].header.name_units()), "TestVar");
    assert_eq!(entries[0].payload, &[1, 2, 3, 4]);

    assert_eq!(entries[1].offset % ENTRY_ALIGNMENT, 0);
    assert_eq!(entries[1].header.status_text.as_str(), "Access Denied");
    assert!(entries[1].payload.is_empty());
}

#[test]
fn empty_drain_yields_nothing() {
    assert!(EntryIter::new(&[]).next().is_none());
}
