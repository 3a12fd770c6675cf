//! Wire contract shared by the variable monitor driver and the tools that
//! drain its log.
//!
//! Everything in here has to agree byte-for-byte between the firmware image
//! that produces log entries and whoever consumes them through the
//! `DrainBuffer` command, so the layout lives in exactly one place.

#![cfg_attr(not(feature = "std"), no_std)]

pub mod constants;
pub mod guid;
pub mod status;
pub mod wire;

pub use guid::Guid;
pub use wire::{EntryHeader, EntryIter, LogEntry, OperationKind, WireError};
