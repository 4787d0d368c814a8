//! Variable-length integer codec used by UPS for sizes and offset gaps.
//!
//! Seven data bits per byte, least significant group first; the terminal
//! byte is flagged by its high bit. Continuation bytes carry an implicit
//! +1 bias, so every value has exactly one encoding. Real .ups files use
//! the biased form, plain 7-bit VLE does not decode them correctly.

use crate::error::{PatchError, Result};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{ErrorKind, Read, Write};

pub fn read_vle<R: Read>(reader: &mut R) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = reader.read_u8().map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                PatchError::Decode("unterminated variable-length integer".to_string())
            } else {
                PatchError::Io(e)
            }
        })?;

        value = value
            .checked_add(((byte & 0x7F) as u64) << shift)
            .ok_or_else(overflow)?;
        if byte & 0x80 != 0 {
            return Ok(value);
        }

        shift += 7;
        if shift > 63 {
            return Err(overflow());
        }
        value = value.checked_add(1u64 << shift).ok_or_else(overflow)?;
    }
}

pub fn write_vle<W: Write>(writer: &mut W, mut value: u64) -> Result<()> {
    loop {
        let low = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            writer.write_u8(0x80 | low)?;
            return Ok(());
        }
        writer.write_u8(low)?;
        value -= 1;
    }
}

fn overflow() -> PatchError {
    PatchError::Decode("variable-length integer does not fit in 64 bits".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn encode(value: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_vle(&mut buf, value).unwrap();
        buf
    }

    fn roundtrip(value: u64) -> u64 {
        read_vle(&mut Cursor::new(encode(value))).unwrap()
    }

    #[test]
    fn known_encodings() {
        assert_eq!(encode(0), vec![0x80]);
        assert_eq!(encode(1), vec![0x81]);
        assert_eq!(encode(0x7F), vec![0xFF]);
        // 0x80 needs a continuation byte; the bias makes it [0x00, 0x80],
        // not [0x00, 0x81].
        assert_eq!(encode(0x80), vec![0x00, 0x80]);
        assert_eq!(encode(0x3FFF), vec![0x7F, 0xFE]);
    }

    #[test]
    fn roundtrip_edges() {
        for value in [
            0,
            1,
            0x7F,
            0x80,
            0x3FFF,
            0x4000,
            u32::MAX as u64 - 1,
            u32::MAX as u64,
            u64::MAX,
        ] {
            assert_eq!(roundtrip(value), value);
        }
    }

    #[test]
    fn truncated_input_is_a_decode_error() {
        // A lone continuation byte with no terminator.
        let err = read_vle(&mut Cursor::new(vec![0x00])).unwrap_err();
        assert!(matches!(err, crate::error::PatchError::Decode(_)));
    }

    proptest! {
        #[test]
        fn roundtrip_all_u32(value in any::<u32>()) {
            prop_assert_eq!(roundtrip(value as u64), value as u64);
        }
    }
}
