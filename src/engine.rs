//! Patch application: sniff, decode, verify, then mutate the target.

use crate::crc32::crc32;
use crate::error::{PatchError, Result};
use crate::ips;
use crate::record::{PatchFile, Payload};
use crate::sniff::{self, FormatKind};
use crate::ups;
use log::{debug, trace, warn};
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// How much detail [`apply`] collects about individual records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet,
    Summary,
    Records,
}

/// Immutable per-invocation settings, passed in by the caller.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub verbosity: Verbosity,
    /// Apply a UPS patch even when the source image fails its size or
    /// checksum check. Corruption of the patch file itself still aborts.
    pub force: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            verbosity: Verbosity::Quiet,
            force: false,
        }
    }
}

/// Randomly seekable read-write byte store being patched.
///
/// `set_len` exists because a UPS patch may shrink the image; plain
/// `Seek + Write` cannot express truncation. Growing through `set_len`
/// zero-fills.
pub trait TargetImage: Read + Write + Seek {
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}

impl TargetImage for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

impl TargetImage for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().resize(len as usize, 0);
        Ok(())
    }
}

/// One applied record, reported back when the caller asked for detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordNotice {
    pub offset: u64,
    pub len: u64,
}

/// Result of comparing the patched image against the checksum the patch
/// declared for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumStatus {
    Matched,
    Mismatched { expected: u32, actual: u32 },
}

#[derive(Debug)]
pub struct ApplyOutcome {
    pub format: FormatKind,
    pub records_applied: usize,
    /// UPS only: post-patch output checksum comparison. A mismatch is
    /// reported, never fatal; the patch has already been applied.
    pub output_check: Option<ChecksumStatus>,
    /// Collected at [`Verbosity::Records`], empty otherwise. The engine
    /// never prints; display belongs to the caller.
    pub notices: Vec<RecordNotice>,
}

/// Applies the patch in `patch` to `target` in place.
///
/// The patch format is sniffed from the stream contents, with
/// `filename_hint` consulted as a shortcut. For UPS, all integrity checks
/// run before the first write, so a rejected patch leaves the target
/// byte-for-byte untouched. Records already applied before an I/O error
/// stay applied; there is no rollback.
pub fn apply<P, T>(
    patch: &mut P,
    target: &mut T,
    filename_hint: Option<&str>,
    config: &EngineConfig,
) -> Result<ApplyOutcome>
where
    P: Read + Seek,
    T: TargetImage,
{
    let kind = sniff::identify(patch, filename_hint)?.ok_or(PatchError::FormatUnrecognized)?;
    debug!("identified {kind} patch");
    match kind {
        FormatKind::Ips => apply_ips(patch, target, config),
        FormatKind::Ups => apply_ups(patch, target, config),
    }
}

fn apply_ips<P, T>(patch: &mut P, target: &mut T, config: &EngineConfig) -> Result<ApplyOutcome>
where
    P: Read + Seek,
    T: TargetImage,
{
    // Decode completely before the first write so a malformed patch never
    // leaves a half-applied target.
    let file = PatchFile {
        format: FormatKind::Ips,
        records: ips::read_patch(patch)?,
        trailer: None,
    };

    let mut target_len = target.seek(SeekFrom::End(0))?;
    let mut notices = Vec::new();
    for record in &file.records {
        if record.offset > target_len {
            // A record past the end of the image: extend with an explicit,
            // deterministic zero fill rather than a bare seek-and-write.
            zero_fill(target, target_len, record.offset)?;
            target_len = record.offset;
        }
        target.seek(SeekFrom::Start(record.offset))?;
        match &record.payload {
            Payload::Literal(data) => target.write_all(data)?,
            Payload::Fill { value, count } => {
                let run = vec![*value; *count as usize];
                target.write_all(&run)?;
            }
        }
        target_len = target_len.max(record.offset + record.len());
        trace!("applied record: offset {}, {} bytes", record.offset, record.len());
        if config.verbosity >= Verbosity::Records {
            notices.push(RecordNotice {
                offset: record.offset,
                len: record.len(),
            });
        }
    }
    target.flush()?;

    Ok(ApplyOutcome {
        format: file.format,
        records_applied: file.records.len(),
        output_check: None,
        notices,
    })
}

fn apply_ups<P, T>(patch: &mut P, target: &mut T, config: &EngineConfig) -> Result<ApplyOutcome>
where
    P: Read + Seek,
    T: TargetImage,
{
    patch.seek(SeekFrom::Start(0))?;
    let mut patch_bytes = Vec::new();
    patch.read_to_end(&mut patch_bytes)?;
    let (records, trailer) = ups::read_patch(&patch_bytes)?;
    let file = PatchFile {
        format: FormatKind::Ups,
        records,
        trailer: Some(trailer),
    };

    target.seek(SeekFrom::Start(0))?;
    let mut source = Vec::new();
    target.read_to_end(&mut source)?;

    // Integrity gate: nothing is written unless the patch itself checks
    // out. The cheap size comparison runs before any CRC work. Source
    // mismatches can be overridden with `force`; a corrupt patch cannot.
    forceable(config, ups::verify_source_size(source.len() as u64, &trailer))?;
    ups::verify_patch(&patch_bytes, &trailer)?;
    forceable(config, ups::verify_source_checksum(&source, &trailer))?;

    let output_len = usize::try_from(trailer.output_size)
        .map_err(|_| PatchError::Decode("declared output size does not fit in memory".to_string()))?;
    let mut output = source;
    output.resize(output_len, 0);
    let mut notices = Vec::new();
    for record in &file.records {
        let in_bounds = record
            .offset
            .checked_add(record.len())
            .is_some_and(|end| end <= output.len() as u64);
        if !in_bounds {
            return Err(PatchError::Decode(format!(
                "record at offset {} extends past the declared output size",
                record.offset
            )));
        }
        match &record.payload {
            Payload::Literal(data) => {
                for (i, &b) in data.iter().enumerate() {
                    output[record.offset as usize + i] ^= b;
                }
            }
            Payload::Fill { value, count } => {
                for i in 0..*count as usize {
                    output[record.offset as usize + i] ^= value;
                }
            }
        }
        trace!("applied record: offset {}, {} bytes", record.offset, record.len());
        if config.verbosity >= Verbosity::Records {
            notices.push(RecordNotice {
                offset: record.offset,
                len: record.len(),
            });
        }
    }
    let actual = crc32(&output);
    let output_check = if actual == trailer.output_checksum {
        ChecksumStatus::Matched
    } else {
        warn!(
            "patched image checksum {actual:08x} does not match recorded {:08x}",
            trailer.output_checksum
        );
        ChecksumStatus::Mismatched {
            expected: trailer.output_checksum,
            actual,
        }
    };

    target.seek(SeekFrom::Start(0))?;
    target.write_all(&output)?;
    target.set_len(output.len() as u64)?;
    target.flush()?;

    Ok(ApplyOutcome {
        format: file.format,
        records_applied: file.records.len(),
        output_check: Some(output_check),
        notices,
    })
}

/// Downgrades a source-image integrity failure to a warning when `force`
/// is set. Any other error passes through untouched.
fn forceable(config: &EngineConfig, result: Result<()>) -> Result<()> {
    match result {
        Err(PatchError::Integrity(reason)) if config.force => {
            warn!("{reason}; applying anyway (force)");
            Ok(())
        }
        other => other,
    }
}

/// Writes zeros over `[from, to)` of the target.
fn zero_fill<T: TargetImage>(target: &mut T, from: u64, to: u64) -> Result<()> {
    const ZEROS: [u8; 4096] = [0; 4096];
    target.seek(SeekFrom::Start(from))?;
    let mut remaining = to - from;
    while remaining > 0 {
        let n = remaining.min(ZEROS.len() as u64) as usize;
        target.write_all(&ZEROS[..n])?;
        remaining -= n as u64;
    }
    Ok(())
}
