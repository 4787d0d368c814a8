//! Patch container detection.
//!
//! Checks the filename extension first (confirmed against the magic, a
//! misleading extension never wins on its own), then falls back to probing
//! each known header in a fixed order. Every probe goes through
//! [`peek_exact`] so the stream is always rewound to the start, both after
//! a failed trial and on a positive match.

use std::fmt;
use std::io::{self, Read, Seek, SeekFrom};

pub const IPS_MAGIC: &[u8; 5] = b"PATCH";
pub const UPS_MAGIC: &[u8; 4] = b"UPS1";

/// Header, size fields and the 12-byte checksum trailer: a stream shorter
/// than this cannot be a structurally complete UPS file.
pub const UPS_MIN_LEN: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Ips,
    Ups,
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatKind::Ips => write!(f, "IPS"),
            FormatKind::Ups => write!(f, "UPS"),
        }
    }
}

/// Decides which codec applies to `stream`.
///
/// Returns `None` when neither magic matches; that usually means the
/// stream is the ROM rather than a patch, and the caller is expected to
/// handle it. The stream is left positioned at the start either way.
pub fn identify<S: Read + Seek>(
    stream: &mut S,
    filename_hint: Option<&str>,
) -> io::Result<Option<FormatKind>> {
    if let Some(name) = filename_hint {
        if let Some(ext) = name.get(name.len().saturating_sub(4)..) {
            if ext.eq_ignore_ascii_case(".ips") && is_ips(stream)? {
                return Ok(Some(FormatKind::Ips));
            }
            if ext.eq_ignore_ascii_case(".ups") && is_ups(stream)? {
                return Ok(Some(FormatKind::Ups));
            }
        }
    }

    // Header probe, fixed priority order.
    if is_ips(stream)? {
        return Ok(Some(FormatKind::Ips));
    }
    if is_ups(stream)? {
        return Ok(Some(FormatKind::Ups));
    }
    Ok(None)
}

fn is_ips<S: Read + Seek>(stream: &mut S) -> io::Result<bool> {
    let mut magic = [0u8; 5];
    Ok(peek_exact(stream, &mut magic)? && &magic == IPS_MAGIC)
}

fn is_ups<S: Read + Seek>(stream: &mut S) -> io::Result<bool> {
    let len = stream.seek(SeekFrom::End(0))?;
    stream.seek(SeekFrom::Start(0))?;
    if len < UPS_MIN_LEN {
        return Ok(false);
    }
    let mut magic = [0u8; 4];
    Ok(peek_exact(stream, &mut magic)? && &magic == UPS_MAGIC)
}

/// Reads `buf.len()` bytes from the start of `stream`, then rewinds.
/// Returns `false` (not an error) when the stream is too short.
fn peek_exact<S: Read + Seek>(stream: &mut S, buf: &mut [u8]) -> io::Result<bool> {
    stream.seek(SeekFrom::Start(0))?;
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    stream.seek(SeekFrom::Start(0))?;
    Ok(filled == buf.len())
}
