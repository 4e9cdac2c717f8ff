//! CLI command implementations
//!
//! Every command that talks to a device takes a boxed `BootloaderDevice`,
//! so the same code drives the USB HID transport and the dummy emulator.

mod flash;
mod info;
mod list;
mod progress;

pub use flash::{run_flash, FlashOptions};
pub use info::run_info;
pub use list::{list_devices, list_transports, list_variants};
