//! IPS container codec.
//!
//! Layout: ASCII "PATCH", then repeated records of a 3-byte big-endian
//! offset and 2-byte big-endian size followed by `size` literal bytes. A
//! size of 0 switches the record to its RLE form: 2-byte run length plus a
//! single fill byte. The record stream ends at the literal "EOF" tri-byte
//! or, in files written without the sentinel, at a clean end of stream
//! where the next offset would start.

use crate::error::{PatchError, Result};
use crate::record::{PatchRecord, Payload};
use crate::sniff::IPS_MAGIC;
use byteorder::{BigEndian, WriteBytesExt};
use std::io::{Read, Write};

/// Offset field value equal to the ASCII bytes "EOF".
const EOF_SENTINEL: [u8; 3] = *b"EOF";

pub const MAX_OFFSET: u64 = 0xFF_FFFF;
pub const MAX_LITERAL_LEN: usize = 0xFFFF;
pub const MAX_RUN_LEN: u32 = 0xFFFF;

/// Reads and checks the 5-byte "PATCH" magic.
pub fn read_header<R: Read>(reader: &mut R) -> Result<()> {
    let mut magic = [0u8; 5];
    let got = read_up_to(reader, &mut magic)?;
    if got < magic.len() || magic != *IPS_MAGIC {
        return Err(PatchError::Decode("missing PATCH header".to_string()));
    }
    Ok(())
}

/// Decodes the next record, or `None` at the end of the record stream.
///
/// A clean end of stream where the offset field would begin is the normal
/// termination, as is the "EOF" sentinel. A short read anywhere after the
/// offset is a decode error: the patch is truncated.
pub fn read_record<R: Read>(reader: &mut R) -> Result<Option<PatchRecord>> {
    let mut offset_buf = [0u8; 3];
    let got = read_up_to(reader, &mut offset_buf)?;
    if got == 0 {
        return Ok(None);
    }
    if got < offset_buf.len() {
        return Err(short_field("offset", got, offset_buf.len()));
    }
    if offset_buf == EOF_SENTINEL {
        return Ok(None);
    }
    let offset = u32::from_be_bytes([0, offset_buf[0], offset_buf[1], offset_buf[2]]) as u64;

    let mut size_buf = [0u8; 2];
    read_field(reader, &mut size_buf, "size")?;
    let size = u16::from_be_bytes(size_buf);

    let payload = if size == 0 {
        let mut run_buf = [0u8; 2];
        read_field(reader, &mut run_buf, "rle_size")?;
        let mut value = [0u8; 1];
        read_field(reader, &mut value, "rle_value")?;
        Payload::Fill {
            value: value[0],
            count: u16::from_be_bytes(run_buf) as u32,
        }
    } else {
        let mut data = vec![0u8; size as usize];
        let got = read_up_to(reader, &mut data)?;
        if got < data.len() {
            return Err(short_field("data", got, data.len()));
        }
        Payload::Literal(data)
    };

    Ok(Some(PatchRecord { offset, payload }))
}

/// Decodes a whole patch stream: header, then records until termination.
pub fn read_patch<R: Read>(reader: &mut R) -> Result<Vec<PatchRecord>> {
    read_header(reader)?;
    let mut records = Vec::new();
    while let Some(record) = read_record(reader)? {
        records.push(record);
    }
    log::debug!("decoded {} IPS records", records.len());
    Ok(records)
}

pub fn write_header<W: Write>(writer: &mut W) -> Result<()> {
    writer.write_all(IPS_MAGIC)?;
    Ok(())
}

/// Encodes one record, the exact inverse of [`read_record`].
pub fn write_record<W: Write>(writer: &mut W, record: &PatchRecord) -> Result<()> {
    if record.offset > MAX_OFFSET {
        return Err(PatchError::Decode(format!(
            "offset {} does not fit in the 24-bit IPS offset field",
            record.offset
        )));
    }
    writer.write_u24::<BigEndian>(record.offset as u32)?;
    match &record.payload {
        Payload::Literal(data) => {
            if data.is_empty() || data.len() > MAX_LITERAL_LEN {
                return Err(PatchError::Decode(format!(
                    "literal record of {} bytes does not fit an IPS record",
                    data.len()
                )));
            }
            writer.write_u16::<BigEndian>(data.len() as u16)?;
            writer.write_all(data)?;
        }
        Payload::Fill { value, count } => {
            if *count > MAX_RUN_LEN {
                return Err(PatchError::Decode(format!(
                    "run of {count} bytes does not fit an IPS RLE record"
                )));
            }
            writer.write_u16::<BigEndian>(0)?;
            writer.write_u16::<BigEndian>(*count as u16)?;
            writer.write_u8(*value)?;
        }
    }
    Ok(())
}

pub fn write_terminator<W: Write>(writer: &mut W) -> Result<()> {
    writer.write_all(&EOF_SENTINEL)?;
    Ok(())
}

fn read_field<R: Read>(reader: &mut R, buf: &mut [u8], field: &str) -> Result<()> {
    let got = read_up_to(reader, buf)?;
    if got < buf.len() {
        return Err(short_field(field, got, buf.len()));
    }
    Ok(())
}

fn short_field(field: &str, got: usize, want: usize) -> PatchError {
    PatchError::Decode(format!(
        "expecting record '{field}' field, got {got} of {want} bytes before reaching end of file"
    ))
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
