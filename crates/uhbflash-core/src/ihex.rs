//! Intel HEX firmware images
//!
//! Records are decoded into [`Segment`]s of contiguous bytes. Data records
//! (00), end of file (01), extended segment address (02) and extended
//! linear address (04) are understood; start address records (03, 05) carry
//! nothing the bootloader needs and are skipped.

use alloc::vec::Vec;

use crate::error::{Error, Result};

/// Contiguous bytes starting at `address`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Address of the first byte
    pub address: u32,
    /// Segment contents
    pub data: Vec<u8>,
}

impl Segment {
    /// Address one past the last byte
    pub fn end(&self) -> u32 {
        self.address.wrapping_add(self.data.len() as u32)
    }
}

mod record {
    pub const DATA: u8 = 0x00;
    pub const EOF: u8 = 0x01;
    pub const EXT_SEGMENT: u8 = 0x02;
    pub const START_SEGMENT: u8 = 0x03;
    pub const EXT_LINEAR: u8 = 0x04;
    pub const START_LINEAR: u8 = 0x05;
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Decode one record line (without the leading colon) into its bytes
fn decode_record(text: &str) -> Option<Vec<u8>> {
    let digits = text.as_bytes();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| Some(hex_digit(pair[0])? << 4 | hex_digit(pair[1])?))
        .collect()
}

/// Parse an Intel HEX file into segments, merging records that continue
/// the previous one.
pub fn parse_ihex(text: &str) -> Result<Vec<Segment>> {
    let mut segments: Vec<Segment> = Vec::new();
    let mut base: u32 = 0;
    let mut seen_eof = false;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let invalid = Error::InvalidHex { line: line_no };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let bytes = line
            .strip_prefix(':')
            .and_then(decode_record)
            .ok_or(invalid)?;
        if bytes.len() < 5 || bytes.len() != 5 + bytes[0] as usize {
            return Err(invalid);
        }
        let checksum = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        if checksum != 0 {
            log::debug!("checksum mismatch on line {}", line_no);
            return Err(invalid);
        }

        let len = bytes[0] as usize;
        let offset = u16::from_be_bytes([bytes[1], bytes[2]]) as u32;
        let kind = bytes[3];
        let payload = &bytes[4..4 + len];

        match kind {
            record::DATA => {
                let address = base.wrapping_add(offset);
                match segments.last_mut() {
                    Some(last) if last.end() == address => last.data.extend_from_slice(payload),
                    _ => segments.push(Segment {
                        address,
                        data: payload.to_vec(),
                    }),
                }
            }
            record::EOF => {
                seen_eof = true;
                break;
            }
            record::EXT_SEGMENT | record::EXT_LINEAR => {
                if len != 2 {
                    return Err(invalid);
                }
                let value = u16::from_be_bytes([payload[0], payload[1]]) as u32;
                base = if kind == record::EXT_SEGMENT {
                    value << 4
                } else {
                    value << 16
                };
            }
            record::START_SEGMENT | record::START_LINEAR => {
                log::trace!("ignoring start address record on line {}", line_no);
            }
            _ => return Err(invalid),
        }
    }

    if !seen_eof {
        log::warn!("Intel HEX file has no end-of-file record");
    }
    segments.retain(|s| !s.data.is_empty());
    Ok(segments)
}
