//! Error types for the HID transport

use thiserror::Error;
use uhbflash_core::error::Error as CoreError;

/// HID transport errors
#[derive(Debug, Error)]
pub enum HidError {
    /// No bootloader with the expected VID/PID is connected
    #[error("bootloader not found (VID:{vid:04x} PID:{pid:04x}, index {index})")]
    DeviceNotFound {
        /// Vendor ID searched for
        vid: u16,
        /// Product ID searched for
        pid: u16,
        /// Requested device index
        index: usize,
    },

    /// Failed to open device
    #[error("Failed to open bootloader device: {0}")]
    OpenFailed(#[source] nusb::Error),

    /// Failed to claim the HID interface or its endpoints
    #[error("Failed to claim interface {interface}: {source}")]
    ClaimFailed {
        /// Interface number
        interface: u8,
        /// Underlying USB error
        #[source]
        source: nusb::Error,
    },

    /// USB transfer failed
    #[error("USB transfer failed: {0}")]
    TransferFailed(String),

    /// Device did not answer in time
    #[error("Timeout during USB transfer")]
    Timeout,

    /// Report larger than the HID packet size
    #[error("Report of {0} bytes does not fit in one HID packet")]
    ReportTooLong(usize),

    /// Core library error
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for HID transport operations
pub type Result<T> = std::result::Result<T, HidError>;

impl From<HidError> for CoreError {
    fn from(e: HidError) -> Self {
        match e {
            HidError::Core(e) => e,
            HidError::Timeout => CoreError::Timeout,
            other => {
                log::error!("{}", other);
                CoreError::TransferFailed
            }
        }
    }
}
