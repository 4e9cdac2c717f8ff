//! Boot info record
//!
//! The bootloader answers the INFO command with a packed record describing
//! the target: a size byte followed by `(field id, value)` entries. The
//! record is the in-memory image of a C struct compiled for the target, so
//! each value is aligned to the smaller of its own size and the target's
//! maximum alignment (1 on 8-bit PICs, 2 on 16-bit PICs, 4 elsewhere).
//! Padding bytes are zero and no field id is zero.

use alloc::vec::Vec;
use core::fmt;

use crate::error::{Error, Result};

/// MCU family identifier reported by the bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct McuType(pub u8);

#[allow(missing_docs)]
impl McuType {
    pub const PIC16: Self = Self(1);
    pub const PIC18: Self = Self(2);
    pub const PIC18FJ: Self = Self(3);
    pub const PIC24: Self = Self(4);
    pub const DSPIC: Self = Self(10);
    pub const DSPIC33: Self = Self(11);
    pub const PIC32: Self = Self(20);
    pub const ARM: Self = Self(30);
    pub const STELLARIS_M3: Self = Self(31);
    pub const STELLARIS_M4: Self = Self(32);
    pub const STELLARIS: Self = Self(33);
    pub const STM32L1XX: Self = Self(34);
    pub const STM32F1XX: Self = Self(35);
    pub const STM32F2XX: Self = Self(36);
    pub const STM32F4XX: Self = Self(37);
}

const MCU_NAMES: &[(McuType, &str)] = &[
    (McuType::PIC16, "PIC16"),
    (McuType::PIC18, "PIC18"),
    (McuType::PIC18FJ, "PIC18FJ"),
    (McuType::PIC24, "PIC24"),
    (McuType::DSPIC, "DSPIC"),
    (McuType::DSPIC33, "DSPIC33"),
    (McuType::PIC32, "PIC32"),
    (McuType::ARM, "ARM"),
    (McuType::STELLARIS_M3, "STELLARIS_M3"),
    (McuType::STELLARIS_M4, "STELLARIS_M4"),
    (McuType::STELLARIS, "STELLARIS"),
    (McuType::STM32L1XX, "STM32L1XX"),
    (McuType::STM32F1XX, "STM32F1XX"),
    (McuType::STM32F2XX, "STM32F2XX"),
    (McuType::STM32F4XX, "STM32F4XX"),
];

impl McuType {
    /// Canonical name of this MCU type, if known
    pub fn name(self) -> Option<&'static str> {
        MCU_NAMES
            .iter()
            .find(|(mcu, _)| *mcu == self)
            .map(|(_, name)| *name)
    }

    /// Look up an MCU type by name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        MCU_NAMES
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(mcu, _)| *mcu)
    }

    /// Maximum alignment of multi-byte values on this MCU
    pub fn alignment(self) -> usize {
        match self {
            Self::PIC16 | Self::PIC18 | Self::PIC18FJ => 1,
            Self::PIC24 | Self::DSPIC | Self::DSPIC33 => 2,
            _ => 4,
        }
    }
}

impl fmt::Display for McuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "MCU type {}", self.0),
        }
    }
}

/// Length of the device description string
pub const DEV_DSC_LEN: usize = 20;

/// Field identifiers in the boot info record
mod field {
    pub const MCU_TYPE: u8 = 1;
    pub const MCU_ID: u8 = 2;
    pub const ERASE_BLOCK: u8 = 3;
    pub const WRITE_BLOCK: u8 = 4;
    pub const BOOT_REV: u8 = 5;
    pub const BOOT_START: u8 = 6;
    pub const DEV_DSC: u8 = 7;
    pub const MCU_SIZE: u8 = 8;
}

/// Size of the value of each field id, `None` for unknown ids
fn field_len(id: u8) -> Option<usize> {
    match id {
        field::MCU_TYPE => Some(1),
        field::ERASE_BLOCK | field::WRITE_BLOCK | field::BOOT_REV => Some(2),
        field::MCU_ID | field::BOOT_START | field::MCU_SIZE => Some(4),
        field::DEV_DSC => Some(DEV_DSC_LEN),
        _ => None,
    }
}

/// Alignment of a value: its natural alignment capped by the MCU's
fn value_alignment(len: usize, mcu_align: usize) -> usize {
    let natural = if len == DEV_DSC_LEN { 1 } else { len };
    natural.min(mcu_align)
}

fn align_up(pos: usize, align: usize) -> usize {
    pos.div_ceil(align) * align
}

/// Target description negotiated with the bootloader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootInfo {
    /// MCU family
    pub mcu_type: McuType,
    /// Address where the bootloader code starts
    pub boot_start: u32,
    /// Size of the smallest erasable unit (also the device's receive buffer)
    pub erase_block: u32,
    /// MCU identifier, if reported
    pub mcu_id: Option<u32>,
    /// Write granularity, if reported
    pub write_block: Option<u16>,
    /// Bootloader revision, if reported
    pub boot_rev: Option<u16>,
    /// Total Flash size, if reported
    pub mcu_size: Option<u32>,
    /// Board description (NUL padded), if reported
    pub dev_dsc: Option<[u8; DEV_DSC_LEN]>,
}

impl BootInfo {
    /// Create a boot info record with only the fields the Flash model needs
    pub fn new(mcu_type: McuType, boot_start: u32, erase_block: u32) -> Self {
        Self {
            mcu_type,
            boot_start,
            erase_block,
            mcu_id: None,
            write_block: None,
            boot_rev: None,
            mcu_size: None,
            dev_dsc: None,
        }
    }

    /// Board description with trailing NULs stripped
    pub fn description(&self) -> Option<&str> {
        let dsc = self.dev_dsc.as_ref()?;
        let end = dsc.iter().position(|&b| b == 0).unwrap_or(dsc.len());
        core::str::from_utf8(&dsc[..end]).ok()
    }

    /// Parse the record sent by the bootloader in response to INFO.
    ///
    /// `buf` may be longer than the record (a whole HID report); only the
    /// number of bytes given by the leading size byte is examined.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let size = *buf.first().ok_or(Error::InvalidBootInfo)? as usize;
        if size == 0 || size > buf.len() {
            return Err(Error::InvalidBootInfo);
        }
        let record = &buf[..size];

        let mut mcu_type = None;
        let mut boot_start = None;
        let mut erase_block = None;
        let mut info = Self::new(McuType(0), 0, 0);

        let mut pos = 1;
        while pos < size {
            let id = record[pos];
            if id == 0 {
                // padding
                pos += 1;
                continue;
            }
            let len = field_len(id).ok_or_else(|| {
                log::debug!("unknown boot info field {} at offset {}", id, pos);
                Error::InvalidBootInfo
            })?;
            let mcu_align = mcu_type.map_or(4, McuType::alignment);
            let start = align_up(pos + 1, value_alignment(len, mcu_align));
            let value = record
                .get(start..start + len)
                .ok_or(Error::InvalidBootInfo)?;

            match id {
                field::MCU_TYPE => mcu_type = Some(McuType(value[0])),
                field::MCU_ID => info.mcu_id = Some(le_u32(value)),
                field::ERASE_BLOCK => erase_block = Some(le_u16(value) as u32),
                field::WRITE_BLOCK => info.write_block = Some(le_u16(value)),
                field::BOOT_REV => info.boot_rev = Some(le_u16(value)),
                field::BOOT_START => boot_start = Some(le_u32(value)),
                field::MCU_SIZE => info.mcu_size = Some(le_u32(value)),
                field::DEV_DSC => {
                    let mut dsc = [0u8; DEV_DSC_LEN];
                    dsc.copy_from_slice(value);
                    info.dev_dsc = Some(dsc);
                }
                _ => unreachable!("field_len accepted an unknown id"),
            }
            pos = start + len;
        }

        match (mcu_type, boot_start, erase_block) {
            (Some(mcu_type), Some(boot_start), Some(erase_block)) => {
                info.mcu_type = mcu_type;
                info.boot_start = boot_start;
                info.erase_block = erase_block;
                Ok(info)
            }
            _ => {
                log::debug!("boot info lacks McuType, BootStart or EraseBlock");
                Err(Error::InvalidBootInfo)
            }
        }
    }

    /// Serialize the record the way the bootloader lays it out in memory.
    ///
    /// `EraseBlock` must fit in 16 bits.
    pub fn encode(&self) -> Vec<u8> {
        let align = self.mcu_type.alignment();
        let mut out = Vec::new();
        out.push(0); // size, patched below

        // Each entry is a small struct: the id byte starts at the entry's
        // alignment and the value follows at the same alignment.
        let mut put = |id: u8, value: &[u8]| {
            let entry_align = value_alignment(value.len(), align);
            let id_pos = align_up(out.len(), entry_align);
            out.resize(id_pos, 0);
            out.push(id);
            let value_pos = align_up(out.len(), entry_align);
            out.resize(value_pos, 0);
            out.extend_from_slice(value);
        };

        put(field::MCU_TYPE, &[self.mcu_type.0]);
        if let Some(size) = self.mcu_size {
            put(field::MCU_SIZE, &size.to_le_bytes());
        }
        put(field::ERASE_BLOCK, &(self.erase_block as u16).to_le_bytes());
        if let Some(write_block) = self.write_block {
            put(field::WRITE_BLOCK, &write_block.to_le_bytes());
        }
        if let Some(rev) = self.boot_rev {
            put(field::BOOT_REV, &rev.to_le_bytes());
        }
        put(field::BOOT_START, &self.boot_start.to_le_bytes());
        if let Some(id) = self.mcu_id {
            put(field::MCU_ID, &id.to_le_bytes());
        }
        if let Some(dsc) = &self.dev_dsc {
            put(field::DEV_DSC, dsc);
        }

        let total = align_up(out.len(), align);
        out.resize(total, 0);
        out[0] = total as u8;
        out
    }
}

fn le_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}
