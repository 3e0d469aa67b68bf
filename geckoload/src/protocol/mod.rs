//! BootMii upload protocol.
//!
//! ## Wire format
//!
//! ```text
//! +---------+------------+---------------------------+
//! |   TAG   |   LENGTH   |          PAYLOAD          |
//! +---------+------------+---------------------------+
//! | 4 ASCII | u32 BE     | LENGTH bytes, sent in     |
//! | bytes   |            | blocks of <= 63,488 bytes |
//! +---------+------------+---------------------------+
//! ```
//!
//! The tag is `BARM` for an ARM binary and `BPPC` for a PPC binary. It is
//! neither length-prefixed nor NUL-terminated.
//!
//! The device never answers. A broken upload is only visible as a local
//! I/O error.

pub mod upload;

use byteorder::{BigEndian, ByteOrder};
use std::fmt;

pub use upload::{Progress, TransferPhase, Uploader, send, upload, validate_payload_size};

/// Largest accepted payload (20 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 20 * 1024 * 1024;

/// Largest payload block handed to the transport in one call.
///
/// The transport re-chunks each block; this only bounds per-call buffers and
/// sets the progress granularity.
pub const BLOCK_SIZE: usize = 63_488;

/// Size of the command tag on the wire.
pub const TAG_SIZE: usize = 4;

/// Size of the tag plus the length field.
pub const HEADER_SIZE: usize = TAG_SIZE + 4;

/// Upload request understood by BootMii.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Load and run an ARM (Starlet) binary.
    UploadArm,
    /// Load and run a PPC (Broadway) binary.
    UploadPpc,
}

impl Command {
    /// Wire tag for this command.
    #[must_use]
    pub const fn tag(self) -> [u8; TAG_SIZE] {
        match self {
            Self::UploadArm => *b"BARM",
            Self::UploadPpc => *b"BPPC",
        }
    }

    /// Short name of the processor the payload runs on.
    pub fn target(self) -> &'static str {
        match self {
            Self::UploadArm => "ARM",
            Self::UploadPpc => "PPC",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} upload", self.target())
    }
}

/// Encode a payload length as 4 big-endian bytes.
#[must_use]
pub fn encode_length(len: u32) -> [u8; 4] {
    let mut buf = [0u8; 4];
    BigEndian::write_u32(&mut buf, len);
    buf
}

/// Encode the 8-byte upload header.
#[must_use]
pub fn encode_header(command: Command, len: u32) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[..TAG_SIZE].copy_from_slice(&command.tag());
    buf[TAG_SIZE..].copy_from_slice(&encode_length(len));
    buf
}
