//! Constants of the backdoor protocol and the log buffer geometry.

use crate::guid::Guid;

/// Vendor id that turns a `GetVariable` call into a command.
/// `{3DEC99FB-86B4-4EED-B4D8-4E6ADDE56F95}`
pub const BACKDOOR_GUID: Guid = Guid::from_fields(
    0x3dec_99fb,
    0x86b4,
    0x4eed,
    [0xb4, 0xd8, 0x4e, 0x6a, 0xdd, 0xe5, 0x6f, 0x95],
);

pub const CMD_REGISTER_CALLBACKS: &str = "RegisterCallbacks";
pub const CMD_UNREGISTER_CALLBACKS: &str = "UnregisterCallbacks";
pub const CMD_DRAIN_BUFFER: &str = "DrainBuffer";

pub const PAGE_SIZE: usize = 4096;
pub const LOG_BUFFER_PAGES: usize = 64;
/// 256 KiB of runtime memory.
pub const LOG_BUFFER_SIZE: usize = LOG_BUFFER_PAGES * PAGE_SIZE;

/// Every entry starts on this boundary.
pub const ENTRY_ALIGNMENT: usize = 0x10;

/// Variable name width in UTF-16 code units, terminator included.
pub const NAME_CAPACITY: usize = 64;
pub const STATUS_TEXT_LEN: usize = 32;

pub const CALLBACK_SLOTS: usize = 8;
