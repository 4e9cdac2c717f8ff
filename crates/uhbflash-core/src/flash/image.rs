//! In-memory image of the device Flash

use alloc::sync::Arc;
use alloc::vec::Vec;

use super::{BootPatch, FlashGeometry, ERASED};
use crate::bootinfo::BootInfo;
use crate::error::{Error, Result};
use crate::protocol::HID_PACKET_SIZE;

/// Staged contents of the Flash blocks below the bootloader
#[derive(Debug)]
pub struct FlashImage {
    boot_start: u32,
    erase_block_size: u32,
    blocks: Vec<Vec<u8>>,
    /// Start address of each block plus the end of the last one
    block_addr: Vec<u32>,
    /// ERASE address for a run ending at each block
    erase_addr: Vec<u32>,
    dirty: Vec<bool>,
    /// Block hit by the last write, where the next search starts
    write_cursor: usize,
    flash_mem_offset: u32,
    patch: Arc<dyn BootPatch>,
}

impl FlashImage {
    /// Build an erased image for the device described by `info`.
    ///
    /// The erase block size doubles as the size of the device's receive
    /// buffer and must be a non-zero multiple of the HID packet size.
    pub fn new(
        info: &BootInfo,
        geometry: &dyn FlashGeometry,
        patch: Arc<dyn BootPatch>,
    ) -> Result<Self> {
        let erase_block_size = info.erase_block;
        if erase_block_size == 0 || erase_block_size as usize % HID_PACKET_SIZE != 0 {
            return Err(Error::InvalidEraseBlock {
                size: erase_block_size,
            });
        }

        let boot_start = geometry.boot_end(info);
        if let Some(mcu_size) = info.mcu_size {
            if boot_start > mcu_size {
                return Err(Error::GeometryMismatch {
                    expected: mcu_size,
                    actual: boot_start,
                });
            }
        }

        let sizes = geometry.block_sizes(info)?;
        let actual = sizes
            .iter()
            .try_fold(0u32, |acc, &size| acc.checked_add(size))
            .ok_or(Error::InvalidGeometry)?;
        if actual != boot_start {
            return Err(Error::GeometryMismatch {
                expected: boot_start,
                actual,
            });
        }

        let block_addr = geometry.block_addresses(&sizes);
        validate_addresses(&sizes, &block_addr)?;

        let erase_addr = (0..sizes.len())
            .map(|i| geometry.erase_addr(&block_addr, i))
            .collect();

        log::debug!(
            "Flash model: {} blocks, boot start 0x{:X}, offset 0x{:X}",
            sizes.len(),
            boot_start,
            geometry.flash_mem_offset()
        );

        Ok(Self {
            boot_start,
            erase_block_size,
            blocks: sizes
                .iter()
                .map(|&size| alloc::vec![ERASED; size as usize])
                .collect(),
            block_addr,
            erase_addr,
            dirty: alloc::vec![false; sizes.len()],
            write_cursor: 0,
            flash_mem_offset: geometry.flash_mem_offset(),
            patch,
        })
    }

    /// Write `data` at an address of the program's address space.
    ///
    /// Bytes written before an out-of-range address is reached stay in the
    /// image.
    pub fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let phys = addr
            .checked_sub(self.flash_mem_offset)
            .ok_or(Error::AddressOutOfRange { addr })?;
        let offset = self.flash_mem_offset;
        self.write_phy(phys, data).map_err(|e| match e {
            Error::AddressOutOfRange { addr } => Error::AddressOutOfRange {
                addr: addr.wrapping_add(offset),
            },
            e => e,
        })
    }

    /// Write `data` at a physical Flash address (relative to the block
    /// address table), splitting it over as many blocks as needed.
    pub fn write_phy(&mut self, mut addr: u32, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let blk = self.find_block(addr)?;
            let start = self.block_addr[blk];
            let block = &mut self.blocks[blk];
            let off = (addr - start) as usize;
            let len = (block.len() - off).min(data.len());

            self.dirty[blk] = true;
            block[off..off + len].copy_from_slice(&data[..len]);

            data = &data[len..];
            addr += len as u32;
            if !data.is_empty() {
                log::debug!("write continues past block {} at 0x{:X}", blk, addr);
            }
        }
        Ok(())
    }

    /// Find the block containing `addr`, searching from the last block
    /// written to.
    fn find_block(&mut self, addr: u32) -> Result<usize> {
        let out_of_range = Error::AddressOutOfRange { addr };
        let last = self.blocks.len().checked_sub(1).ok_or(out_of_range)?;
        let mut blk = self.write_cursor.min(last);
        let mut moved_up = None;

        loop {
            let start = self.block_addr[blk];
            let end = start + self.blocks[blk].len() as u32;
            if addr >= end {
                // Turning around means addr lies in a gap between blocks
                if blk == last || moved_up == Some(false) {
                    return Err(out_of_range);
                }
                moved_up = Some(true);
                blk += 1;
            } else if addr < start {
                if blk == 0 || moved_up == Some(true) {
                    return Err(out_of_range);
                }
                moved_up = Some(false);
                blk -= 1;
            } else {
                self.write_cursor = blk;
                return Ok(blk);
            }
        }
    }

    /// Apply the device variant's bootloader patch to the staged firmware
    pub fn fix_bootloader(&mut self) -> Result<()> {
        let patch = Arc::clone(&self.patch);
        log::debug!("applying {} bootloader patch", patch.name());
        patch.apply(self)
    }

    /// Address given to ERASE for a run of blocks ending at `index`
    pub fn block_erase_addr(&self, index: usize) -> u32 {
        self.erase_addr[index]
    }

    /// Bootloader start as an offset into Flash
    pub fn boot_start(&self) -> u32 {
        self.boot_start
    }

    /// Erase block size, also the size of the device's receive buffer
    pub fn erase_block_size(&self) -> u32 {
        self.erase_block_size
    }

    /// Address at which the Flash appears in the program's address space
    pub fn flash_mem_offset(&self) -> u32 {
        self.flash_mem_offset
    }

    /// Number of blocks
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Contents of block `index`
    pub fn block(&self, index: usize) -> &[u8] {
        &self.blocks[index]
    }

    /// Start address of block `index`; `block_addr(block_count())` is the
    /// end of the last block
    pub fn block_addr(&self, index: usize) -> u32 {
        self.block_addr[index]
    }

    /// Whether block `index` was written to
    pub fn is_dirty(&self, index: usize) -> bool {
        self.dirty[index]
    }

    /// Dirty flag of every block
    pub fn dirty(&self) -> &[bool] {
        &self.dirty
    }
}

/// Blocks must be ordered and must not overlap; the table ends with the end
/// of the last block.
fn validate_addresses(sizes: &[u32], addrs: &[u32]) -> Result<()> {
    if addrs.len() != sizes.len() + 1 {
        return Err(Error::InvalidGeometry);
    }
    for (i, &size) in sizes.iter().enumerate() {
        let end = addrs[i].checked_add(size).ok_or(Error::InvalidGeometry)?;
        let next = addrs[i + 1];
        let is_last = i + 1 == sizes.len();
        if (is_last && next != end) || (!is_last && next < end) {
            return Err(Error::InvalidGeometry);
        }
    }
    Ok(())
}
