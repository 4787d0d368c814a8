//! Applies IPS and UPS binary delta patches to ROM images.
//!
//! The entry point is [`engine::apply`]: hand it a seekable patch stream,
//! a seekable read-write target and an optional filename hint, and it
//! sniffs the container format, decodes the record sequence, verifies
//! checksums (UPS) and applies the edits in file order.

pub mod crc32;
pub mod engine;
pub mod error;
pub mod ips;
pub mod record;
pub mod sniff;
pub mod ups;
pub mod vle;

pub use engine::{
    apply, ApplyOutcome, ChecksumStatus, EngineConfig, RecordNotice, TargetImage, Verbosity,
};
pub use error::{PatchError, Result};
pub use record::{PatchFile, PatchRecord, Payload, UpsTrailer};
pub use sniff::FormatKind;
