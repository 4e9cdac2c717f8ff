//! uhbflash-core - Core library for USB HID bootloader flashing
//!
//! This crate models the Flash memory of a microcontroller running a
//! USB HID bootloader as a set of erase blocks, stages firmware writes into
//! that model and replays only the modified blocks to the device using the
//! bootloader's ERASE/WRITE protocol. It is `no_std` compatible (it needs
//! `alloc`); the `std` feature adds TOML device profiles.
//!
//! # Example
//!
//! ```ignore
//! use uhbflash_core::{device::BootloaderDevice, session::Session, variant::Registry};
//!
//! fn program<D: BootloaderDevice>(dev: &mut D, segments: &[(u32, &[u8])]) -> uhbflash_core::Result<()> {
//!     let mut session = Session::new(dev);
//!     let info = session.info()?;
//!     session.enter_bootloader()?;
//!
//!     let registry = Registry::builtin()?;
//!     let mut image = registry.construct(&info)?;
//!     for (addr, data) in segments {
//!         image.write(*addr, data)?;
//!     }
//!     session.flash(&mut image)?;
//!     session.reboot()
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod bootinfo;
pub mod device;
pub mod encoder;
pub mod error;
pub mod flash;
pub mod ihex;
pub mod protocol;
pub mod session;
pub mod variant;

pub use error::{Error, Result};
