//! Bootloader wire protocol
//!
//! The host talks to the bootloader with 64-byte HID reports. A command
//! report starts with an 8-byte header (`STX`, opcode, address, counter);
//! acknowledgements echo `STX` and the opcode. Raw data reports following a
//! WRITE command carry firmware bytes only.

mod command;

pub use command::{Command, Opcode, Response, STX};

/// Payload size of one HID report
pub const HID_PACKET_SIZE: usize = 64;
