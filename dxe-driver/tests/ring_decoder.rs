//! Decodes what `LogRing::drain_into` hands out, the way an OS-side
//! reader does: walk the bytes with `shared::wire::EntryIter`.

use std::ptr::NonNull;

use shared::Guid;
use shared::constants::{ENTRY_ALIGNMENT, NAME_CAPACITY};
use shared::status;
use shared::wire::{self, EntryIter, OperationKind, WireError};
use var_monitor::communications::log_ring::LogRing;
use var_monitor::sync::SoftLevel;

fn units(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

fn drained(ring: &LogRing<SoftLevel>) -> Vec<u8> {
    let mut out = vec![0u8; ring.capacity()];
    let used = ring.drain_into(&mut out).unwrap();
    out.truncate(used);
    out
}

#[test]
fn odd_payloads_decode_back_in_order() {
    let mut backing = vec![0u8; 8192];
    let ring = LogRing::<SoftLevel>::new();
    unsafe { ring.attach(NonNull::new(backing.as_mut_ptr()).unwrap(), backing.len()) };

    let vendor = Guid::from_bytes(&[0x11; 16]);
    for (i, len) in [0usize, 1, 15, 16, 17].into_iter().enumerate() {
        let payload: Vec<u8> = (0..len as u8).collect();
        let kind = if i % 2 == 0 { OperationKind::Get } else { OperationKind::Set };
        assert!(ring.append(kind, &units(&format!("Var{i}")), vendor, 0x3, status::SUCCESS, &payload));
    }

    let bytes = drained(&ring);
    let decoded: Vec<_> = EntryIter::new(&bytes).collect::<Result<_, _>>().unwrap();
    assert_eq!(decoded.len(), 5);
    for (i, entry) in decoded.iter().enumerate() {
        assert_eq!(entry.offset % ENTRY_ALIGNMENT, 0);
        assert_eq!(String::from_utf16(entry.header.name_units()).unwrap(), format!("Var{i}"));
        assert_eq!(entry.header.vendor, vendor);
        assert_eq!(entry.payload.len(), entry.header.payload_len);
    }
    assert_eq!(decoded[4].payload, (0..17).collect::<Vec<u8>>());
    assert_eq!(decoded[1].header.kind(), Some(OperationKind::Set));
}

#[test]
fn long_names_are_cut_and_terminated() {
    let mut backing = vec![0u8; 4096];
    let ring = LogRing::<SoftLevel>::new();
    unsafe { ring.attach(NonNull::new(backing.as_mut_ptr()).unwrap(), backing.len()) };

    let long = "N".repeat(NAME_CAPACITY * 2);
    ring.append(OperationKind::Get, &units(&long), Guid::default(), 0, status::NOT_FOUND, &[]);

    let bytes = drained(&ring);
    let entry = EntryIter::new(&bytes).next().unwrap().unwrap();
    assert_eq!(entry.header.name_units().len(), NAME_CAPACITY - 1);
    assert_eq!(entry.header.name[NAME_CAPACITY - 1], 0);
    assert_eq!(entry.header.status_text.as_str(), "Not Found");
}

#[test]
fn corrupt_length_stops_the_walk() {
    let mut backing = vec![0u8; 4096];
    let ring = LogRing::<SoftLevel>::new();
    unsafe { ring.attach(NonNull::new(backing.as_mut_ptr()).unwrap(), backing.len()) };
    ring.append(OperationKind::Set, &units("A"), Guid::default(), 0, 0, &[1, 2, 3]);
    ring.append(OperationKind::Set, &units("B"), Guid::default(), 0, 0, &[4, 5, 6]);

    let mut bytes = drained(&ring);
    let huge = usize::MAX / 2;
    bytes[wire::PAYLOAD_LEN_OFFSET..wire::PAYLOAD_LEN_OFFSET + size_of::<usize>()]
        .copy_from_slice(&huge.to_ne_bytes());

    let mut walk = EntryIter::new(&bytes);
    assert!(matches!(walk.next(), Some(Err(WireError::PayloadOverrun { offset: 0, .. }))));
    assert!(walk.next().is_none());
}
