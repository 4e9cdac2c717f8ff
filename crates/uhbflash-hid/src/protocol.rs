//! USB identifiers and report framing

use std::time::Duration;

use uhbflash_core::protocol::HID_PACKET_SIZE;

/// Bootloader USB VID
pub const BOOTLOADER_VID: u16 = 0x1234;
/// Bootloader USB PID
pub const BOOTLOADER_PID: u16 = 0x0001;

/// HID interface number
pub const HID_INTERFACE: u8 = 0;
/// Interrupt OUT endpoint (host to device reports)
pub const WRITE_EP: u8 = 0x01;
/// Interrupt IN endpoint (device to host reports)
pub const READ_EP: u8 = 0x81;

/// Timeout for a single report transfer
pub const USB_TIMEOUT: Duration = Duration::from_secs(5);

/// Pad `data` with zeros to a full report.
///
/// Returns `None` if `data` does not fit in one report.
pub fn frame_report(data: &[u8]) -> Option<[u8; HID_PACKET_SIZE]> {
    if data.len() > HID_PACKET_SIZE {
        return None;
    }
    let mut report = [0u8; HID_PACKET_SIZE];
    report[..data.len()].copy_from_slice(data);
    Some(report)
}

/// Round an IN request up to whole packets of `max_packet_size` bytes
pub fn request_len(len: usize, max_packet_size: usize) -> usize {
    if max_packet_size == 0 {
        return len;
    }
    len.div_ceil(max_packet_size) * max_packet_size
}
