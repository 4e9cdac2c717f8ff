//! Command and acknowledgement reports

use heapless::Vec;
use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::HID_PACKET_SIZE;
use crate::error::{Error, Result};

/// Start-of-command marker
pub const STX: u8 = 0x0F;

/// Bootloader command opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Synchronize with the bootloader
    Sync = 1,
    /// Request the boot info record
    Info = 2,
    /// Stay in the bootloader (stop the boot countdown)
    Boot = 3,
    /// Restart the MCU
    Reboot = 4,
    /// Program `counter` bytes at `address`; data reports follow
    Write = 11,
    /// Erase `counter` blocks ending at the block containing `address`
    Erase = 21,
}

impl Opcode {
    /// Decode an opcode byte
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Sync),
            2 => Some(Self::Info),
            3 => Some(Self::Boot),
            4 => Some(Self::Reboot),
            11 => Some(Self::Write),
            21 => Some(Self::Erase),
            _ => None,
        }
    }
}

/// Command header as laid out on the wire
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct CommandHeader {
    stx: u8,
    opcode: u8,
    address: U32,
    counter: U16,
}

/// A command sent from the host to the bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    /// Command opcode
    pub opcode: Opcode,
    /// Target address (WRITE, ERASE)
    pub address: u32,
    /// Byte count (WRITE) or block count (ERASE)
    pub counter: u16,
}

impl Command {
    /// Build a command
    pub const fn new(opcode: Opcode, address: u32, counter: u16) -> Self {
        Self {
            opcode,
            address,
            counter,
        }
    }

    /// Build a command without address or counter
    pub const fn simple(opcode: Opcode) -> Self {
        Self::new(opcode, 0, 0)
    }

    /// Encode into a zero-padded HID report
    pub fn to_report(&self) -> [u8; HID_PACKET_SIZE] {
        let header = CommandHeader {
            stx: STX,
            opcode: self.opcode as u8,
            address: U32::new(self.address),
            counter: U16::new(self.counter),
        };
        let mut report = [0u8; HID_PACKET_SIZE];
        let bytes = header.as_bytes();
        report[..bytes.len()].copy_from_slice(bytes);
        report
    }

    /// Decode a command report (device side)
    pub fn from_report(report: &[u8]) -> Option<Self> {
        let (header, _) = CommandHeader::read_from_prefix(report).ok()?;
        if header.stx != STX {
            return None;
        }
        Some(Self {
            opcode: Opcode::from_u8(header.opcode)?,
            address: header.address.get(),
            counter: header.counter.get(),
        })
    }
}

/// A report received from the bootloader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    data: Vec<u8, HID_PACKET_SIZE>,
}

impl Response {
    /// Wrap a received report; bytes past the report size are dropped
    pub fn new(data: &[u8]) -> Self {
        let len = data.len().min(HID_PACKET_SIZE);
        let mut buf = Vec::new();
        // Cannot fail: len is capped at the capacity
        let _ = buf.extend_from_slice(&data[..len]);
        Self { data: buf }
    }

    /// Build the acknowledgement the bootloader sends for `opcode`
    pub fn ack(opcode: Opcode) -> Self {
        Self::new(&Command::simple(opcode).to_report())
    }

    /// Raw report bytes
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Check that this report acknowledges `opcode`
    pub fn expect(&self, opcode: Opcode) -> Result<()> {
        match self.data.as_slice() {
            [STX, found, ..] if *found == opcode as u8 => Ok(()),
            [STX, found, ..] => Err(Error::ProtocolMismatch {
                expected: opcode,
                found: *found,
            }),
            _ => Err(Error::ProtocolMismatch {
                expected: opcode,
                found: 0,
            }),
        }
    }
}
