//! Flash block layouts

use alloc::borrow::Cow;
use alloc::vec::Vec;
use core::fmt;

use crate::bootinfo::BootInfo;
use crate::error::{Error, Result};
use crate::protocol::HID_PACKET_SIZE;

/// Describes how a device's Flash below the bootloader is split into
/// erase blocks.
pub trait FlashGeometry: fmt::Debug + Send + Sync {
    /// Sizes of the erase blocks, in address order. They must add up to
    /// [`boot_end`](Self::boot_end).
    fn block_sizes(&self, info: &BootInfo) -> Result<Vec<u32>>;

    /// Offset of the bootloader from the start of Flash.
    ///
    /// Some bootloaders (PIC32) report `BootStart` in the program's address
    /// space rather than as a Flash offset.
    fn boot_end(&self, info: &BootInfo) -> u32 {
        info.boot_start
            .checked_sub(self.flash_mem_offset())
            .unwrap_or(info.boot_start)
    }

    /// Start address of each block followed by the end address of the last
    /// one (`sizes.len() + 1` entries).
    ///
    /// The default packs the blocks contiguously from address 0.
    fn block_addresses(&self, sizes: &[u32]) -> Vec<u32> {
        let mut addrs = Vec::with_capacity(sizes.len() + 1);
        let mut addr = 0u32;
        addrs.push(addr);
        for &size in sizes {
            addr = addr.wrapping_add(size);
            addrs.push(addr);
        }
        addrs
    }

    /// Address given to ERASE for a run of blocks ending at `index`.
    ///
    /// The default is the block's own start address.
    fn erase_addr(&self, block_addr: &[u32], index: usize) -> u32 {
        block_addr[index]
    }

    /// Address at which the Flash is mapped in the program's address space
    fn flash_mem_offset(&self) -> u32 {
        0
    }
}

/// Equal blocks of the device's erase block size from 0 to the bootloader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniformGeometry {
    /// Address at which the Flash is mapped
    pub flash_base: u32,
}

impl UniformGeometry {
    /// Uniform layout mapped at `flash_base`
    pub const fn new(flash_base: u32) -> Self {
        Self { flash_base }
    }
}

impl FlashGeometry for UniformGeometry {
    fn block_sizes(&self, info: &BootInfo) -> Result<Vec<u32>> {
        let size = info.erase_block;
        if size == 0 {
            return Err(Error::InvalidEraseBlock { size });
        }
        let boot_end = self.boot_end(info);
        let count = boot_end / size;
        if count * size != boot_end {
            return Err(Error::GeometryMismatch {
                expected: boot_end,
                actual: count * size,
            });
        }
        Ok(alloc::vec![size; count as usize])
    }

    fn flash_mem_offset(&self) -> u32 {
        self.flash_base
    }
}

/// A run of `count` consecutive sectors of `size` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorRun {
    /// Size of each sector in bytes
    pub size: u32,
    /// Number of sectors
    pub count: u32,
}

impl SectorRun {
    /// Create a sector run
    pub const fn new(size: u32, count: u32) -> Self {
        Self { size, count }
    }
}

/// STM32F2/F4 main Flash: four 16 KiB, one 64 KiB and six 128 KiB sectors
pub const STM32_SECTORS: &[SectorRun] = &[
    SectorRun::new(16 * 1024, 4),
    SectorRun::new(64 * 1024, 1),
    SectorRun::new(128 * 1024, 6),
];

/// Fixed table of variable-size sectors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorGeometry {
    /// Sector runs in address order
    pub sectors: Cow<'static, [SectorRun]>,
    /// Address at which the Flash is mapped
    pub flash_base: u32,
}

impl SectorGeometry {
    /// Sector layout mapped at `flash_base`
    pub fn new(sectors: impl Into<Cow<'static, [SectorRun]>>, flash_base: u32) -> Self {
        Self {
            sectors: sectors.into(),
            flash_base,
        }
    }

    /// STM32 layout mapped at 0x0800_0000
    pub const fn stm32() -> Self {
        Self {
            sectors: Cow::Borrowed(STM32_SECTORS),
            flash_base: 0x0800_0000,
        }
    }

    /// Total size of all sectors
    pub fn total_size(&self) -> u64 {
        self.sectors
            .iter()
            .map(|run| run.size as u64 * run.count as u64)
            .sum()
    }
}

impl FlashGeometry for SectorGeometry {
    fn block_sizes(&self, info: &BootInfo) -> Result<Vec<u32>> {
        if self
            .sectors
            .iter()
            .any(|run| run.size == 0 || run.size as usize % HID_PACKET_SIZE != 0)
        {
            return Err(Error::InvalidGeometry);
        }

        let total = self.total_size();
        let boot_end = self.boot_end(info);
        if total != boot_end as u64 {
            return Err(Error::GeometryMismatch {
                expected: boot_end,
                actual: u32::try_from(total).unwrap_or(u32::MAX),
            });
        }

        let mut sizes = Vec::new();
        for run in self.sectors.iter() {
            sizes.extend(core::iter::repeat(run.size).take(run.count as usize));
        }
        Ok(sizes)
    }

    fn flash_mem_offset(&self) -> u32 {
        self.flash_base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootinfo::McuType;

    #[test]
    fn test_uniform_blocks() {
        let info = BootInfo::new(McuType::PIC32, 0x1000, 0x400);
        let geometry = UniformGeometry::default();
        let sizes = geometry.block_sizes(&info).unwrap();
        assert_eq!(sizes, [0x400; 4]);
        assert_eq!(
            geometry.block_addresses(&sizes),
            [0, 0x400, 0x800, 0xC00, 0x1000]
        );
        assert_eq!(geometry.flash_mem_offset(), 0);
    }

    #[test]
    fn test_uniform_rejects_partial_block() {
        let info = BootInfo::new(McuType::PIC32, 0x1100, 0x400);
        assert_eq!(
            UniformGeometry::default().block_sizes(&info),
            Err(Error::GeometryMismatch {
                expected: 0x1100,
                actual: 0x1000
            })
        );

        let info = BootInfo::new(McuType::PIC32, 0x1000, 0);
        assert_eq!(
            UniformGeometry::default().block_sizes(&info),
            Err(Error::InvalidEraseBlock { size: 0 })
        );
    }

    #[test]
    fn test_boot_start_in_program_space() {
        let info = BootInfo::new(McuType::PIC32, 0x9D07_C000, 0x1000);
        let geometry = UniformGeometry::new(0x9D00_0000);
        assert_eq!(geometry.boot_end(&info), 0x7C000);
        assert_eq!(geometry.block_sizes(&info).unwrap().len(), 0x7C);

        // BootStart below the Flash base is already a Flash offset
        let info = BootInfo::new(McuType::STM32F4XX, 0xE0000, 0x4000);
        assert_eq!(SectorGeometry::stm32().boot_end(&info), 0xE0000);
    }

    #[test]
    fn test_stm32_sectors() {
        let geometry = SectorGeometry::stm32();
        assert_eq!(geometry.total_size(), 0xE0000);
        assert_eq!(geometry.flash_mem_offset(), 0x0800_0000);

        let info = BootInfo::new(McuType::STM32F4XX, 0xE0000, 0x4000);
        let sizes = geometry.block_sizes(&info).unwrap();
        assert_eq!(sizes.len(), 11);
        assert_eq!(&sizes[..4], &[0x4000; 4]);
        assert_eq!(sizes[4], 0x10000);
        assert_eq!(&sizes[5..], &[0x20000; 6]);

        let addrs = geometry.block_addresses(&sizes);
        assert_eq!(addrs[4], 0x10000);
        assert_eq!(addrs[5], 0x20000);
        assert_eq!(addrs[11], 0xE0000);
    }

    #[test]
    fn test_sectors_must_cover_flash() {
        let info = BootInfo::new(McuType::STM32F4XX, 0x100000, 0x4000);
        assert_eq!(
            SectorGeometry::stm32().block_sizes(&info),
            Err(Error::GeometryMismatch {
                expected: 0x100000,
                actual: 0xE0000
            })
        );
    }

    #[test]
    fn test_sectors_must_be_packet_multiples() {
        let geometry = SectorGeometry::new(alloc::vec![SectorRun::new(100, 2)], 0);
        let info = BootInfo::new(McuType::PIC32, 200, 0x40);
        assert_eq!(geometry.block_sizes(&info), Err(Error::InvalidGeometry));
    }
}
