//! Bit-template instruction encoder
//!
//! Instructions are described as strings of bits, most significant bit
//! first. Lowercase letters mark the bits of a single field: `a` is the
//! field's most significant bit, `b` the next one and so on. A letter may
//! appear anywhere in the template, which lets encodings that scatter an
//! immediate over the word (ARM-Thumb `movw`/`movt`) be written literally:
//!
//! ```
//! use uhbflash_core::encoder::{encode_instruction, Endianness};
//!
//! // mov sp, r0
//! let insn = encode_instruction("0100011010000101", None, Endianness::Little).unwrap();
//! assert_eq!(&insn[..], &[0x85, 0x46]);
//! ```

use heapless::Vec;

use crate::error::{Error, Result};

/// Byte order of an encoded instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endianness {
    /// Least significant byte first
    #[default]
    Little,
    /// Most significant byte first
    Big,
}

/// An encoded instruction (1, 2 or 4 bytes)
pub type Instruction = Vec<u8, 4>;

/// Assemble an instruction from a bit template.
///
/// `field` is required whenever the template contains letters. Values wider
/// than the field are rejected with [`Error::FieldOverflow`].
pub fn encode_instruction(
    template: &str,
    field: Option<u32>,
    endianness: Endianness,
) -> Result<Instruction> {
    let mut width: u8 = 0;
    let mut len = 0usize;
    for ch in template.chars() {
        match ch {
            '0' | '1' => {}
            'a'..='z' => width = width.max(ch as u8 - b'a' + 1),
            _ => return Err(Error::InvalidTemplate { ch }),
        }
        len += 1;
    }

    let field = match (width, field) {
        (0, _) => 0,
        (_, None) => return Err(Error::MissingField),
        (bits, Some(value)) => {
            if value >> bits != 0 {
                return Err(Error::FieldOverflow { value, bits });
            }
            value
        }
    };

    if !matches!(len, 8 | 16 | 32) {
        return Err(Error::InvalidTemplateLength { len });
    }

    let mut word: u32 = 0;
    for ch in template.bytes() {
        let bit = match ch {
            b'0' => 0,
            b'1' => 1,
            letter => (field >> (width - 1 - (letter - b'a'))) & 1,
        };
        word = (word << 1) | bit;
    }

    let nbytes = len / 8;
    let bytes = match endianness {
        Endianness::Little => word.to_le_bytes(),
        Endianness::Big => word.to_be_bytes(),
    };
    let bytes = match endianness {
        Endianness::Little => &bytes[..nbytes],
        Endianness::Big => &bytes[4 - nbytes..],
    };

    Vec::from_slice(bytes).map_err(|_| Error::InvalidTemplateLength { len })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOVW_R0: &str = "0fgh0000ijklmnop11110e100100abcd";
    const MOVT_R0: &str = "0fgh0000ijklmnop11110e101100abcd";

    /// Recover the field value from an encoded word by reading back the
    /// bits at the letter positions of the template.
    fn decode_field(template: &str, word: u32) -> u32 {
        let len = template.len();
        let width = template
            .bytes()
            .filter(u8::is_ascii_lowercase)
            .map(|c| c - b'a' + 1)
            .max()
            .unwrap_or(0);
        let mut field = 0u32;
        for (pos, c) in template.bytes().enumerate() {
            if c.is_ascii_lowercase() {
                let bit = (word >> (len - 1 - pos)) & 1;
                field |= bit << (width - 1 - (c - b'a'));
            }
        }
        field
    }

    #[test]
    fn test_constant_templates() {
        for size in [8, 16, 32] {
            let template = "0".repeat(size);
            let insn = encode_instruction(&template, None, Endianness::Little).unwrap();
            assert_eq!(insn.len(), size / 8);
            assert!(insn.iter().all(|&b| b == 0));
        }

        let insn = encode_instruction("0100011100000000", None, Endianness::Little).unwrap();
        assert_eq!(&insn[..], &[0x00, 0x47]); // bx r0
    }

    #[test]
    fn test_movw_movt() {
        let lo = encode_instruction(MOVW_R0, Some(0xFFFC), Endianness::Little).unwrap();
        assert_eq!(&lo[..], &[0x4F, 0xF6, 0xFC, 0x70]);

        let hi = encode_instruction(MOVT_R0, Some(0x2001), Endianness::Little).unwrap();
        assert_eq!(&hi[..], &[0xC2, 0xF2, 0x01, 0x00]);
    }

    #[test]
    fn test_endianness() {
        let le = encode_instruction("0001001000110100", None, Endianness::Little).unwrap();
        let be = encode_instruction("0001001000110100", None, Endianness::Big).unwrap();
        assert_eq!(&le[..], &[0x34, 0x12]);
        assert_eq!(&be[..], &[0x12, 0x34]);
    }

    #[test]
    fn test_field_recovered_from_scattered_bits() {
        for value in [0u32, 1, 0x1234, 0x8000, 0xFFFF, 0x2001, 0x0800] {
            let insn = encode_instruction(MOVW_R0, Some(value), Endianness::Big).unwrap();
            let word = u32::from_be_bytes([insn[0], insn[1], insn[2], insn[3]]);
            assert_eq!(decode_field(MOVW_R0, word), value);
        }

        let template = "a0b1c0d1e0f1g0h1";
        let insn = encode_instruction(template, Some(0xA5), Endianness::Little).unwrap();
        let word = u16::from_le_bytes([insn[0], insn[1]]) as u32;
        assert_eq!(decode_field(template, word), 0xA5);
    }

    #[test]
    fn test_narrow_field_is_left_padded() {
        // Field "ab" with value 1 renders as "01"
        let insn = encode_instruction("000000ab", Some(1), Endianness::Little).unwrap();
        assert_eq!(&insn[..], &[0x01]);
        let insn = encode_instruction("ab000000", Some(1), Endianness::Little).unwrap();
        assert_eq!(&insn[..], &[0x40]);
    }

    #[test]
    fn test_invalid_character() {
        assert_eq!(
            encode_instruction("0000000-", Some(1), Endianness::Little),
            Err(Error::InvalidTemplate { ch: '-' })
        );
        assert_eq!(
            encode_instruction("000000A0", None, Endianness::Little),
            Err(Error::InvalidTemplate { ch: 'A' })
        );
    }

    #[test]
    fn test_missing_field() {
        assert_eq!(
            encode_instruction("0000000a", None, Endianness::Little),
            Err(Error::MissingField)
        );
    }

    #[test]
    fn test_field_overflow() {
        assert_eq!(
            encode_instruction("000000ab", Some(4), Endianness::Little),
            Err(Error::FieldOverflow { value: 4, bits: 2 })
        );
        assert!(encode_instruction(MOVW_R0, Some(0x1_0000), Endianness::Little).is_err());
    }

    #[test]
    fn test_invalid_length() {
        assert_eq!(
            encode_instruction("0000", None, Endianness::Little),
            Err(Error::InvalidTemplateLength { len: 4 })
        );
        assert_eq!(
            encode_instruction(&"1".repeat(24), None, Endianness::Little),
            Err(Error::InvalidTemplateLength { len: 24 })
        );
    }
}
