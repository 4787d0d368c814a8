//! Table-driven CRC32 over the reflected IEEE polynomial.
//!
//! UPS trailers store three of these checksums; the digest here must match
//! the standard zlib/PNG CRC32 byte for byte or real patch files will be
//! rejected.

use std::io::{self, Read};

const POLYNOMIAL: u32 = 0xEDB8_8320;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut byte = 0;
    while byte < 256 {
        let mut crc = byte as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[byte] = crc;
        byte += 1;
    }
    table
}

/// Streaming CRC32 digest.
#[derive(Debug, Clone)]
pub struct Crc32 {
    state: u32,
}

impl Crc32 {
    pub fn new() -> Self {
        Crc32 { state: 0xFFFF_FFFF }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state = TABLE[((self.state ^ b as u32) & 0xFF) as usize] ^ (self.state >> 8);
        }
    }

    /// Finishes the digest, applying the final one's complement.
    pub fn finalize(self) -> u32 {
        self.state ^ 0xFFFF_FFFF
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Crc32::new()
    }
}

/// CRC32 of a complete byte slice.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut digest = Crc32::new();
    digest.update(bytes);
    digest.finalize()
}

/// CRC32 of everything remaining in `reader`.
pub fn crc32_reader<R: Read>(reader: &mut R) -> io::Result<u32> {
    let mut digest = Crc32::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
    }
    Ok(digest.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn empty_input() {
        assert_eq!(crc32(b""), 0x0000_0000);
    }

    #[test]
    fn check_value() {
        // The standard CRC32 check vector.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn chunked_update_matches_one_shot() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let mut digest = Crc32::new();
        for chunk in data.chunks(7) {
            digest.update(chunk);
        }
        assert_eq!(digest.finalize(), crc32(data));
    }

    #[test]
    fn reader_matches_slice() {
        let data: Vec<u8> = (0u8..=255).cycle().take(20_000).collect();
        let from_reader = crc32_reader(&mut Cursor::new(&data)).unwrap();
        assert_eq!(from_reader, crc32(&data));
    }

    #[test]
    fn matches_crc32fast() {
        let data: Vec<u8> = (0u8..=255).cycle().take(4099).collect();
        assert_eq!(crc32(&data), crc32fast::hash(&data));
        assert_eq!(crc32(b"UPS1"), crc32fast::hash(b"UPS1"));
    }
}
