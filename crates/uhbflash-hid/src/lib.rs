//! uhbflash-hid - USB HID transport for the bootloader
//!
//! The bootloader enumerates as a vendor HID device with one interrupt IN
//! and one interrupt OUT endpoint and exchanges fixed 64-byte reports. The
//! host does not need an HID stack: the interface is claimed directly with
//! nusb and the reports are moved with blocking interrupt transfers.
//!
//! # Example
//!
//! ```no_run
//! use uhbflash_core::session::Session;
//! use uhbflash_hid::HidBootloader;
//!
//! let dev = HidBootloader::open()?;
//! let mut session = Session::new(dev);
//! let info = session.info()?;
//! println!("{} with bootloader at 0x{:X}", info.mcu_type, info.boot_start);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod device;
mod error;
pub mod protocol;

pub use device::{HidBootloader, HidDeviceInfo};
pub use error::{HidError, Result};
