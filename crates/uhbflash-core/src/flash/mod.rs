//! Flash memory model
//!
//! A [`FlashImage`] holds one 0xFF-filled buffer per erase block between
//! address 0 and the bootloader. Firmware writes land in those buffers and
//! mark their blocks dirty; [`FlashImage::transfer`] then erases and
//! rewrites only the dirty blocks on the device.
//!
//! How the blocks are laid out is described by a [`FlashGeometry`]; what
//! has to change in the firmware so the bootloader keeps control after a
//! reset is described by a [`BootPatch`].

mod geometry;
mod image;
mod patch;
mod transfer;

pub use geometry::{FlashGeometry, SectorGeometry, SectorRun, UniformGeometry, STM32_SECTORS};
pub use image::FlashImage;
pub use patch::{thumb_reset_stub, BootPatch, NoPatch, ThumbRedirect, STUB_LEN};
pub use transfer::{NoProgress, TransferProgress, TransferStats};

/// Value of an erased Flash byte
pub const ERASED: u8 = 0xFF;

/// Maximum number of data bytes sent with a single WRITE command
pub const WRITE_MAX: usize = 0x8000;
