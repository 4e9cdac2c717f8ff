//! Bootloader redirect patches
//!
//! The bootloader only runs if the MCU jumps into it after reset. On
//! ARM-Thumb parts the reset vector of the firmware is pointed at the
//! bootloader, and a short stub placed right below the bootloader restores
//! the firmware's stack pointer and jumps to its original reset handler.

use alloc::vec::Vec;
use core::fmt;

use super::FlashImage;
use crate::encoder::{encode_instruction, Endianness};
use crate::error::{Error, Result};

/// Length of the reset stub the bootloader jumps to
pub const STUB_LEN: usize = 20;

const MOVW_R0: &str = "0fgh0000ijklmnop11110e100100abcd";
const MOVT_R0: &str = "0fgh0000ijklmnop11110e101100abcd";
const MOV_SP_R0: &str = "0100011010000101";
const BX_R0: &str = "0100011100000000";

/// Firmware modification needed for the bootloader to keep control
pub trait BootPatch: fmt::Debug + Send + Sync {
    /// Short name used in logs and listings
    fn name(&self) -> &'static str;

    /// Patch the staged firmware
    fn apply(&self, image: &mut FlashImage) -> Result<()>;
}

/// Leaves the firmware untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPatch;

impl BootPatch for NoPatch {
    fn name(&self) -> &'static str {
        "none"
    }

    fn apply(&self, _image: &mut FlashImage) -> Result<()> {
        Ok(())
    }
}

/// Points the ARM-Thumb reset vector at the bootloader and installs a stub
/// that starts the firmware
#[derive(Debug, Clone, Copy, Default)]
pub struct ThumbRedirect;

impl BootPatch for ThumbRedirect {
    fn name(&self) -> &'static str {
        "thumb"
    }

    fn apply(&self, image: &mut FlashImage) -> Result<()> {
        if image.block_count() == 0 || image.block(0).len() < 8 {
            return Err(Error::AddressOutOfRange { addr: 0 });
        }
        let vectors = &image.block(0)[..8];
        let stack_pointer = u32::from_le_bytes([vectors[0], vectors[1], vectors[2], vectors[3]]);
        let mut reset_address =
            u32::from_le_bytes([vectors[4], vectors[5], vectors[6], vectors[7]]);
        log::debug!(
            "vectors before fix: sp=0x{:08X} reset=0x{:08X}",
            stack_pointer,
            reset_address
        );

        if reset_address & 1 == 0 {
            log::warn!(
                "reset address 0x{:X} does not have a Thumb mark, enforcing it",
                reset_address
            );
            reset_address |= 1;
        }

        let boot_start = image.boot_start();
        image.write_phy(4, &(boot_start | 1).to_le_bytes())?;
        log::debug!("reset vector now points to 0x{:08X}", boot_start | 1);

        let stub = thumb_reset_stub(stack_pointer, reset_address)?;
        assert_eq!(stub.len(), STUB_LEN, "bootloader expects a 20 byte stub");
        let stub_addr = boot_start
            .checked_sub(STUB_LEN as u32)
            .ok_or(Error::AddressOutOfRange { addr: boot_start })?;
        log::debug!("reset stub at 0x{:X}: {:02X?}", stub_addr, stub);
        image.write_phy(stub_addr, &stub)
    }
}

/// `movw r0, #lo; movt r0, #hi`
fn load_r0(out: &mut Vec<u8>, value: u32) -> Result<()> {
    let lo = encode_instruction(MOVW_R0, Some(value & 0xFFFF), Endianness::Little)?;
    let hi = encode_instruction(MOVT_R0, Some(value >> 16), Endianness::Little)?;
    out.extend_from_slice(&lo);
    out.extend_from_slice(&hi);
    Ok(())
}

/// Build the Thumb-2 stub that loads `stack_pointer` into SP and branches
/// to `reset_address`
pub fn thumb_reset_stub(stack_pointer: u32, reset_address: u32) -> Result<Vec<u8>> {
    let mut stub = Vec::with_capacity(STUB_LEN);
    load_r0(&mut stub, stack_pointer)?;
    stub.extend_from_slice(&encode_instruction(MOV_SP_R0, None, Endianness::Little)?);
    load_r0(&mut stub, reset_address)?;
    stub.extend_from_slice(&encode_instruction(BX_R0, None, Endianness::Little)?);
    Ok(stub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootinfo::{BootInfo, McuType};
    use crate::flash::{SectorGeometry, UniformGeometry};
    use alloc::sync::Arc;

    #[test]
    fn test_stub_bytes() {
        let stub = thumb_reset_stub(0x2001_FFFC, 0x0000_7E99).unwrap();
        assert_eq!(
            stub,
            [
                0x4F, 0xF6, 0xFC, 0x70, // movw r0, #0xfffc
                0xC2, 0xF2, 0x01, 0x00, // movt r0, #0x2001
                0x85, 0x46, // mov sp, r0
                0x47, 0xF6, 0x99, 0x60, // movw r0, #0x7e99
                0xC0, 0xF2, 0x00, 0x00, // movt r0, #0
                0x00, 0x47, // bx r0
            ]
        );
    }

    #[test]
    fn test_redirect_generic_layout() {
        let info = BootInfo::new(McuType::STELLARIS_M4, 0x3000, 0x400);
        let mut image =
            FlashImage::new(&info, &UniformGeometry::default(), Arc::new(ThumbRedirect)).unwrap();
        image
            .write(0, &[0x00, 0x10, 0x00, 0x20, 0x40, 0x01, 0x00, 0x00])
            .unwrap();
        image.fix_bootloader().unwrap();

        // even reset address gets the Thumb bit
        assert_eq!(&image.block(0)[..8], &[0x00, 0x10, 0x00, 0x20, 0x01, 0x30, 0x00, 0x00]);
        assert_eq!(
            &image.block(11)[0x400 - STUB_LEN..],
            &[
                0x41, 0xF2, 0x00, 0x00, // movw r0, #0x1000
                0xC2, 0xF2, 0x00, 0x00, // movt r0, #0x2000
                0x85, 0x46, // mov sp, r0
                0x40, 0xF2, 0x41, 0x10, // movw r0, #0x141
                0xC0, 0xF2, 0x00, 0x00, // movt r0, #0
                0x00, 0x47, // bx r0
            ]
        );
        assert!(image.is_dirty(11));
        assert!(!image.is_dirty(5));
    }

    #[test]
    fn test_redirect_stm32_vectors() {
        let info = BootInfo::new(McuType::STM32F4XX, 0xE0000, 0x4000);
        let mut image =
            FlashImage::new(&info, &SectorGeometry::stm32(), Arc::new(ThumbRedirect)).unwrap();
        // sp = 0x20001000, reset = 0x08000100 (no Thumb bit)
        image
            .write(0x0800_0000, &[0x00, 0x10, 0x00, 0x20, 0x00, 0x01, 0x00, 0x08])
            .unwrap();
        image.fix_bootloader().unwrap();

        assert_eq!(&image.block(0)[..8], &[0x00, 0x10, 0x00, 0x20, 0x01, 0x00, 0x0E, 0x00]);
        assert_eq!(
            &image.block(10)[0x20000 - STUB_LEN..],
            &[
                0x41, 0xF2, 0x00, 0x00, // movw r0, #0x1000
                0xC2, 0xF2, 0x00, 0x00, // movt r0, #0x2000
                0x85, 0x46, // mov sp, r0
                0x40, 0xF2, 0x01, 0x10, // movw r0, #0x0101
                0xC0, 0xF6, 0x00, 0x00, // movt r0, #0x0800
                0x00, 0x47, // bx r0
            ]
        );
    }

    #[test]
    fn test_redirect_marks_first_block_dirty() {
        let info = BootInfo::new(McuType::STM32F4XX, 0xE0000, 0x4000);
        let mut image =
            FlashImage::new(&info, &SectorGeometry::stm32(), Arc::new(ThumbRedirect)).unwrap();
        image.fix_bootloader().unwrap();
        assert!(image.is_dirty(0));
        assert!(image.is_dirty(10));
        // erased vectors: sp and reset are 0xFFFFFFFF
        assert_eq!(&image.block(0)[4..8], &[0x01, 0x00, 0x0E, 0x00]);
    }

    #[test]
    fn test_no_patch() {
        let info = BootInfo::new(McuType::PIC32, 0x1000, 0x400);
        let mut image =
            FlashImage::new(&info, &UniformGeometry::default(), Arc::new(NoPatch)).unwrap();
        image.fix_bootloader().unwrap();
        assert!(image.dirty().iter().all(|d| !d));
    }
}
