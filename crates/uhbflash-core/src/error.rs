//! Error types for uhbflash-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

use crate::bootinfo::McuType;
use crate::protocol::Opcode;

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Instruction encoder errors
    /// Template contains a character other than `0`, `1` or `a`-`z`
    InvalidTemplate {
        /// The offending character
        ch: char,
    },
    /// Template is not 8, 16 or 32 bits long
    InvalidTemplateLength {
        /// Number of bits in the template
        len: usize,
    },
    /// Template has field letters but no field value was given
    MissingField,
    /// Field value does not fit in the bits the template reserves for it
    FieldOverflow {
        /// The field value
        value: u32,
        /// Width of the field in bits
        bits: u8,
    },

    // Flash model errors
    /// Address is not covered by any Flash block
    AddressOutOfRange {
        /// Physical address that was accessed
        addr: u32,
    },
    /// Erase block size is zero or not a multiple of the HID packet size
    InvalidEraseBlock {
        /// Erase block size reported by the device
        size: u32,
    },
    /// Flash layout does not add up to the bootloader start address
    GeometryMismatch {
        /// Expected size (the bootloader start address)
        expected: u32,
        /// Sum of all block sizes
        actual: u32,
    },
    /// Block address table is not strictly increasing or overlaps blocks
    InvalidGeometry,

    // Device registry errors
    /// No variant supports this MCU
    UnsupportedDevice {
        /// MCU type reported by the bootloader
        mcu: McuType,
    },
    /// Two variants claim the same MCU
    DuplicateMcu {
        /// The MCU claimed twice
        mcu: McuType,
    },
    /// MCU name is not a known bootloader MCU type
    UnknownMcuName,

    // Protocol errors
    /// Device answered with something other than the expected acknowledgement
    ProtocolMismatch {
        /// Command that should have been acknowledged
        expected: Opcode,
        /// Opcode byte actually received
        found: u8,
    },
    /// Boot info record is malformed or lacks a required field
    InvalidBootInfo,
    /// Transport failed to send or receive a packet
    TransferFailed,
    /// Transport timed out waiting for the device
    Timeout,
    /// Device is not in a state that allows the operation
    DeviceNotReady,

    // Image errors
    /// Malformed Intel HEX record
    InvalidHex {
        /// 1-based line number of the record
        line: usize,
    },
    /// Device profile file could not be read
    ProfileIo,
    /// Device profile file could not be parsed
    ProfileParse,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTemplate { ch } => {
                write!(f, "character {:?} is not allowed in an instruction template", ch)
            }
            Self::InvalidTemplateLength { len } => {
                write!(f, "instruction template has {} bits (expected 8, 16 or 32)", len)
            }
            Self::MissingField => write!(f, "instruction template requires a field value"),
            Self::FieldOverflow { value, bits } => {
                write!(f, "field value 0x{:X} does not fit in {} bits", value, bits)
            }
            Self::AddressOutOfRange { addr } => {
                write!(f, "address 0x{:08X} is outside the programmable Flash", addr)
            }
            Self::InvalidEraseBlock { size } => {
                write!(f, "invalid erase block size 0x{:X}", size)
            }
            Self::GeometryMismatch { expected, actual } => write!(
                f,
                "Flash blocks cover 0x{:X} bytes but the bootloader starts at 0x{:X}",
                actual, expected
            ),
            Self::InvalidGeometry => write!(f, "invalid Flash block address table"),
            Self::UnsupportedDevice { mcu } => write!(f, "support for {} is not implemented", mcu),
            Self::DuplicateMcu { mcu } => {
                write!(f, "{} is claimed by more than one device variant", mcu)
            }
            Self::UnknownMcuName => write!(f, "unknown MCU name"),
            Self::ProtocolMismatch { expected, found } => write!(
                f,
                "expected {:?} acknowledgement, device sent opcode 0x{:02X}",
                expected, found
            ),
            Self::InvalidBootInfo => write!(f, "malformed boot info record"),
            Self::TransferFailed => write!(f, "USB transfer failed"),
            Self::Timeout => write!(f, "timed out waiting for the device"),
            Self::DeviceNotReady => write!(f, "device not ready"),
            Self::InvalidHex { line } => write!(f, "invalid Intel HEX record on line {}", line),
            Self::ProfileIo => write!(f, "failed to read device profile file"),
            Self::ProfileParse => write!(f, "failed to parse device profile file"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
