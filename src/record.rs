//! Decoded patch representation shared by both container codecs.

use crate::sniff::FormatKind;

/// One edit unit. Records apply in file order; later records may overlap
/// earlier ones and win.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRecord {
    /// Byte position in the target where the edit begins.
    pub offset: u64,
    pub payload: Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Bytes written (IPS) or XOR-merged (UPS) starting at the offset.
    /// Never empty: an IPS size of 0 is the RLE sentinel, not a literal.
    Literal(Vec<u8>),
    /// One byte value repeated `count` times starting at the offset.
    Fill { value: u8, count: u32 },
}

impl PatchRecord {
    /// Number of target bytes this record covers.
    pub fn len(&self) -> u64 {
        match &self.payload {
            Payload::Literal(data) => data.len() as u64,
            Payload::Fill { count, .. } => *count as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fully decoded patch container, immutable once built.
#[derive(Debug, Clone)]
pub struct PatchFile {
    pub format: FormatKind,
    pub records: Vec<PatchRecord>,
    /// Present only for UPS.
    pub trailer: Option<UpsTrailer>,
}

/// The twelve trailing bytes of a UPS file plus its declared sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsTrailer {
    /// Expected size of the source image before patching.
    pub input_size: u64,
    /// Expected size of the image after patching.
    pub output_size: u64,
    pub input_checksum: u32,
    pub output_checksum: u32,
    pub patch_checksum: u32,
}
