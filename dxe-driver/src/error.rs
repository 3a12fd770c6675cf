use r_efi::efi;
use thiserror::Error;

/// Everything that can go wrong inside the monitor. Converted to an
/// `efi::Status` only at the `extern "efiapi"` boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MonitorError {
    #[error("a pre-operation callback vetoed the call")]
    AccessDenied,
    #[error("invalid parameter")]
    InvalidParameter,
    #[error("no free callback slot")]
    OutOfResources,
    #[error("buffer too small, {required} bytes required")]
    BufferTooSmall { required: usize },
    #[error("original service is not hooked")]
    Unsupported,
    #[error("firmware call failed: {:#x}", .0.as_usize())]
    Firmware(efi::Status),
}

impl From<MonitorError> for efi::Status {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::AccessDenied => efi::Status::ACCESS_DENIED,
            MonitorError::InvalidParameter => efi::Status::INVALID_PARAMETER,
            MonitorError::OutOfResources => efi::Status::OUT_OF_RESOURCES,
            MonitorError::BufferTooSmall { .. } => efi::Status::BUFFER_TOO_SMALL,
            MonitorError::Unsupported => efi::Status::UNSUPPORTED,
            MonitorError::Firmware(status) => status,
        }
    }
}

/// `Ok(())` → `SUCCESS`, `Err(e)` → its status.
pub fn into_status(result: Result<(), MonitorError>) -> efi::Status {
    match result {
        Ok(()) => efi::Status::SUCCESS,
        Err(err) => err.into(),
    }
}
