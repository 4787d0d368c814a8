//! UPS container codec.
//!
//! Layout: ASCII "UPS1", VLE input and output sizes, then records of a VLE
//! offset gap followed by XOR bytes terminated by 0x00, and finally a
//! 12-byte trailer of three little-endian CRC32s (source, output, patch).
//! Offsets are relative: each gap is added to a running cursor, and the
//! cursor moves one past each run because the terminator byte occupies a
//! target position of its own.

use crate::crc32::crc32;
use crate::error::{PatchError, Result};
use crate::record::{PatchRecord, Payload, UpsTrailer};
use crate::sniff::{UPS_MAGIC, UPS_MIN_LEN};
use crate::vle::read_vle;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{Cursor, Read};

/// Three CRC32 values.
pub const TRAILER_LEN: usize = 12;

/// Upper bound on the declared image sizes. The size fields are plain VLE
/// integers, so a corrupt or hostile patch can declare any value; treating
/// anything past 4 GiB as malformed turns an absurd allocation request
/// into a decode error. No ROM comes anywhere near this.
pub const MAX_IMAGE_LEN: u64 = 1 << 32;

/// Reads and checks the 4-byte "UPS1" magic.
pub fn read_header<R: Read>(reader: &mut R) -> Result<()> {
    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|_| PatchError::Decode("missing UPS1 header".to_string()))?;
    if magic != *UPS_MAGIC {
        return Err(PatchError::Decode("missing UPS1 header".to_string()));
    }
    Ok(())
}

/// Reads the declared source and destination image sizes.
pub fn read_sizes<R: Read>(reader: &mut R) -> Result<(u64, u64)> {
    let input_size = read_vle(reader)?;
    let output_size = read_vle(reader)?;
    Ok((input_size, output_size))
}

/// Fully decodes a UPS patch: trailer, header, sizes and all records.
///
/// The whole patch is taken as a byte slice because verification needs a
/// checksum over it anyway. The record region is bounded by the trailer
/// position; running out of bytes mid-record means the record region
/// overran the trailer and the patch is malformed.
pub fn read_patch(patch: &[u8]) -> Result<(Vec<PatchRecord>, UpsTrailer)> {
    if (patch.len() as u64) < UPS_MIN_LEN {
        return Err(PatchError::Decode(
            "file too short to be a UPS patch".to_string(),
        ));
    }

    let trailer_at = patch.len() - TRAILER_LEN;
    let mut tail = Cursor::new(&patch[trailer_at..]);
    let input_checksum = tail.read_u32::<LittleEndian>()?;
    let output_checksum = tail.read_u32::<LittleEndian>()?;
    let patch_checksum = tail.read_u32::<LittleEndian>()?;

    let mut body = Cursor::new(&patch[..trailer_at]);
    read_header(&mut body)?;
    let (input_size, output_size) = read_sizes(&mut body)?;
    if input_size > MAX_IMAGE_LEN || output_size > MAX_IMAGE_LEN {
        return Err(PatchError::Decode(format!(
            "declared image sizes {input_size} and {output_size} are implausibly large"
        )));
    }
    log::debug!("UPS sizes: input {input_size}, output {output_size}");

    let mut records = Vec::new();
    let mut cursor: u64 = 0;
    while (body.position() as usize) < trailer_at {
        let gap = read_vle(&mut body)?;
        let mut data = Vec::new();
        loop {
            let byte = body.read_u8().map_err(|_| {
                PatchError::Decode("record run overruns the checksum trailer".to_string())
            })?;
            if byte == 0 {
                break;
            }
            data.push(byte);
        }
        let offset = cursor.checked_add(gap).ok_or_else(offset_overflow)?;
        cursor = offset
            .checked_add(data.len() as u64 + 1)
            .ok_or_else(offset_overflow)?;
        if !data.is_empty() {
            records.push(PatchRecord {
                offset,
                payload: Payload::Literal(data),
            });
        }
    }
    log::debug!("decoded {} UPS records", records.len());

    Ok((
        records,
        UpsTrailer {
            input_size,
            output_size,
            input_checksum,
            output_checksum,
            patch_checksum,
        },
    ))
}

/// Checks the patch file against its own recorded checksum. The checksum
/// field itself is excluded from the digest.
pub fn verify_patch(patch: &[u8], trailer: &UpsTrailer) -> Result<()> {
    let actual = crc32(&patch[..patch.len() - 4]);
    if actual != trailer.patch_checksum {
        return Err(PatchError::Integrity(format!(
            "patch file corrupt: checksum {:08x} does not match recorded {:08x}",
            actual, trailer.patch_checksum
        )));
    }
    Ok(())
}

/// Checks the source image size against the trailer. Separate from the
/// checksum comparison so callers can run it first as a cheap rejection
/// before any CRC work.
pub fn verify_source_size(source_len: u64, trailer: &UpsTrailer) -> Result<()> {
    if source_len != trailer.input_size {
        return Err(PatchError::Integrity(format!(
            "wrong source image: expected {} bytes, got {}",
            trailer.input_size, source_len
        )));
    }
    Ok(())
}

/// Checks the source image checksum against the trailer.
pub fn verify_source_checksum(source: &[u8], trailer: &UpsTrailer) -> Result<()> {
    let actual = crc32(source);
    if actual != trailer.input_checksum {
        return Err(PatchError::Integrity(format!(
            "wrong or corrupt source image: checksum {:08x} does not match recorded {:08x}",
            actual, trailer.input_checksum
        )));
    }
    Ok(())
}

fn offset_overflow() -> PatchError {
    PatchError::Decode("record offset gap overflows a 64-bit offset".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vle::write_vle;

    /// Builds a well-formed UPS patch from XOR runs of (gap, bytes).
    fn build_patch(source: &[u8], output: &[u8], runs: &[(u64, &[u8])]) -> Vec<u8> {
        let mut patch = UPS_MAGIC.to_vec();
        write_vle(&mut patch, source.len() as u64).unwrap();
        write_vle(&mut patch, output.len() as u64).unwrap();
        for (gap, xor) in runs {
            write_vle(&mut patch, *gap).unwrap();
            patch.extend_from_slice(xor);
            patch.push(0);
        }
        patch.extend_from_slice(&crc32(source).to_le_bytes());
        patch.extend_from_slice(&crc32(output).to_le_bytes());
        let patch_crc = crc32(&patch);
        patch.extend_from_slice(&patch_crc.to_le_bytes());
        patch
    }

    #[test]
    fn decodes_sizes_records_and_trailer() {
        let source = b"AAAA";
        let output = b"ABCA";
        let xor = [b'A' ^ b'B', b'A' ^ b'C'];
        let patch = build_patch(source, output, &[(1, &xor)]);

        let (records, trailer) = read_patch(&patch).unwrap();
        assert_eq!(trailer.input_size, 4);
        assert_eq!(trailer.output_size, 4);
        assert_eq!(trailer.input_checksum, crc32(source));
        assert_eq!(trailer.output_checksum, crc32(output));
        assert_eq!(
            records,
            vec![PatchRecord {
                offset: 1,
                payload: Payload::Literal(xor.to_vec()),
            }]
        );
    }

    #[test]
    fn relative_offsets_accumulate_past_run_terminators() {
        // Two runs: offsets 2 and 2 + 1 (run) + 1 (terminator) + 3 (gap).
        let patch = build_patch(b"AAAAAAAAAA", b"AAAAAAAAAA", &[(2, &[0x11]), (3, &[0x22])]);
        let (records, _) = read_patch(&patch).unwrap();
        assert_eq!(records[0].offset, 2);
        assert_eq!(records[1].offset, 7);
    }

    #[test]
    fn rejects_short_file() {
        assert!(matches!(
            read_patch(b"UPS1\x80\x80"),
            Err(PatchError::Decode(_))
        ));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut patch = build_patch(b"A", b"B", &[(0, &[3])]);
        patch[0] = b'X';
        assert!(matches!(read_patch(&patch), Err(PatchError::Decode(_))));
    }

    #[test]
    fn unterminated_run_is_an_error() {
        let mut patch = UPS_MAGIC.to_vec();
        write_vle(&mut patch, 4).unwrap();
        write_vle(&mut patch, 4).unwrap();
        write_vle(&mut patch, 0).unwrap();
        patch.extend_from_slice(&[0x11, 0x22]); // no 0x00 before the trailer
        patch.extend_from_slice(&[0u8; TRAILER_LEN]);
        let err = read_patch(&patch).unwrap_err();
        assert!(matches!(err, PatchError::Decode(_)));
    }

    #[test]
    fn verify_accepts_matching_patch_and_source() {
        let patch = build_patch(b"AAAA", b"ABCA", &[(1, &[1, 2])]);
        let (_, trailer) = read_patch(&patch).unwrap();
        verify_patch(&patch, &trailer).unwrap();
        verify_source_size(4, &trailer).unwrap();
        verify_source_checksum(b"AAAA", &trailer).unwrap();
    }

    #[test]
    fn verify_rejects_corrupt_patch() {
        let mut patch = build_patch(b"AAAA", b"ABCA", &[(1, &[1, 2])]);
        let last = patch.len() - 1;
        patch[last] ^= 0xFF; // flip the recorded patch checksum
        let (_, trailer) = read_patch(&patch).unwrap();
        let err = verify_patch(&patch, &trailer).unwrap_err();
        assert!(matches!(err, PatchError::Integrity(_)));
    }

    #[test]
    fn verify_rejects_wrong_source() {
        let patch = build_patch(b"AAAA", b"ABCA", &[(1, &[1, 2])]);
        let (_, trailer) = read_patch(&patch).unwrap();

        let err = verify_source_size(3, &trailer).unwrap_err();
        assert!(matches!(err, PatchError::Integrity(_)));

        // Right size, wrong content.
        let err = verify_source_checksum(b"AAAB", &trailer).unwrap_err();
        assert!(matches!(err, PatchError::Integrity(_)));
    }

    #[test]
    fn absurd_offset_gap_is_a_decode_error() {
        // A gap of u64::MAX would wrap the running cursor; the decoder
        // must reject it rather than produce a bogus offset.
        let mut patch = UPS_MAGIC.to_vec();
        write_vle(&mut patch, 4).unwrap();
        write_vle(&mut patch, 4).unwrap();
        write_vle(&mut patch, u64::MAX).unwrap();
        patch.push(0x11);
        patch.push(0);
        patch.extend_from_slice(&[0u8; TRAILER_LEN]);

        let err = read_patch(&patch).unwrap_err();
        match err {
            PatchError::Decode(msg) => {
                assert!(msg.contains("overflows"), "unexpected message: {msg}")
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn implausible_declared_sizes_are_a_decode_error() {
        let mut patch = UPS_MAGIC.to_vec();
        write_vle(&mut patch, 4).unwrap();
        write_vle(&mut patch, u64::MAX).unwrap(); // output size
        patch.extend_from_slice(&[0u8; TRAILER_LEN]);

        let err = read_patch(&patch).unwrap_err();
        match err {
            PatchError::Decode(msg) => {
                assert!(msg.contains("implausibly large"), "unexpected message: {msg}")
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }
}
