//! Driver-side constants not covered by `shared::constants`.

use r_efi::efi;

use crate::helpers::efi_guid;

pub use shared::constants::{CALLBACK_SLOTS, LOG_BUFFER_PAGES, NAME_CAPACITY, PAGE_SIZE};

/// Interrupt priority (CR8 value) the spin locks run at; mirrors NT's
/// DISPATCH_LEVEL so the OS cannot preempt us with a same-level re-entry.
pub const DISPATCH_LEVEL: usize = 2;

/// TPL used while the service table is being patched.
pub const PATCH_TPL: efi::Tpl = efi::TPL_HIGH_LEVEL;

/// `{3DEC99FB-86B4-4EED-B4D8-4E6ADDE56F95}` in firmware representation.
pub const BACKDOOR_GUID: efi::Guid = efi_guid(&shared::constants::BACKDOOR_GUID);

/// Maximum level compiled into the serial log.
#[cfg(debug_assertions)]
pub const LOG_LEVEL: log::LevelFilter = log::LevelFilter::Debug;
#[cfg(not(debug_assertions))]
pub const LOG_LEVEL: log::LevelFilter = log::LevelFilter::Info;

/// Longest serial log line, prefix included; longer messages are cut.
pub const LOG_LINE_MAX: usize = 160;
