//! Upload session: tag, length, then the payload in blocks.
//!
//! ```rust,no_run
//! use geckoload::port::{Backend, PortConfig};
//! use geckoload::protocol::{Command, upload};
//! use geckoload::transport::Connection;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let data = std::fs::read("armboot.bin")?;
//!     let mut conn = Connection::open(&PortConfig::new(Backend::serial("/dev/ttyUSB0")))?;
//!     upload(&mut conn, Command::UploadArm, &data, |p| {
//!         println!("block {}/{}", p.block, p.blocks);
//!     })?;
//!     Ok(())
//! }
//! ```

use crate::error::TransferError;
use crate::protocol::{BLOCK_SIZE, Command, MAX_PAYLOAD_SIZE, TAG_SIZE, encode_header};
use crate::transport::{Connection, WriteExact};
use log::{debug, trace};
use std::fmt;

/// Part of an upload in flight when the transport failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPhase {
    /// The 4-byte command tag.
    Tag,
    /// The 4-byte length field.
    Length,
    /// A payload block.
    Block {
        /// Zero-based block index.
        index: usize,
        /// Payload offset of the block's first byte.
        offset: usize,
    },
}

impl fmt::Display for TransferPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tag => f.write_str("command tag"),
            Self::Length => f.write_str("length field"),
            Self::Block { index, offset } => write!(f, "block {index} (offset {offset:#x})"),
        }
    }
}

/// Progress after a block was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Blocks sent so far, starting at 1.
    pub block: usize,
    /// Total number of blocks.
    pub blocks: usize,
    /// Payload bytes sent so far.
    pub bytes_sent: usize,
    /// Payload size.
    pub total: usize,
}

impl Progress {
    /// Whether this is the last block.
    pub fn is_complete(&self) -> bool {
        self.bytes_sent == self.total
    }
}

/// Check that a payload size is in `1..=MAX_PAYLOAD_SIZE`.
pub fn validate_payload_size(size: usize) -> Result<(), TransferError> {
    if (1..=MAX_PAYLOAD_SIZE).contains(&size) {
        Ok(())
    } else {
        Err(TransferError::InvalidPayloadSize {
            size,
            max: MAX_PAYLOAD_SIZE,
        })
    }
}

/// Upload driver borrowing an open connection.
pub struct Uploader<'a, W: WriteExact + ?Sized = Connection> {
    conn: &'a mut W,
    block_size: usize,
}

impl<'a, W: WriteExact + ?Sized> Uploader<'a, W> {
    /// Create an uploader with the standard block size.
    pub fn new(conn: &'a mut W) -> Self {
        Self {
            conn,
            block_size: BLOCK_SIZE,
        }
    }

    /// Override the block size.
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Send one upload.
    ///
    /// The payload size is not range-checked here, only that it fits the
    /// 32-bit length field; see [`upload`] for the validating entry point.
    /// On error the stream position is undefined and the connection must be
    /// reopened before another upload.
    pub fn send<F>(
        &mut self,
        command: Command,
        payload: &[u8],
        mut progress: F,
    ) -> Result<(), TransferError>
    where
        F: FnMut(Progress),
    {
        let total = payload.len();
        let len = u32::try_from(total).map_err(|_| TransferError::InvalidPayloadSize {
            size: total,
            max: MAX_PAYLOAD_SIZE,
        })?;
        let header = encode_header(command, len);

        debug!("Sending {command} request");
        self.conn
            .write_exact(&header[..TAG_SIZE])
            .map_err(|source| TransferError::Transport {
                phase: TransferPhase::Tag,
                source,
            })?;

        debug!("Sending payload size ({total} bytes)");
        self.conn
            .write_exact(&header[TAG_SIZE..])
            .map_err(|source| TransferError::Transport {
                phase: TransferPhase::Length,
                source,
            })?;

        let blocks = total.div_ceil(self.block_size);
        let mut offset = 0;
        for (index, block) in payload
            .chunks(self.block_size)
            .enumerate()
        {
            trace!("Sending block {}/{blocks} ({} bytes)", index + 1, block.len());
            self.conn
                .write_exact(block)
                .map_err(|source| TransferError::Transport {
                    phase: TransferPhase::Block { index, offset },
                    source,
                })?;

            offset += block.len();
            progress(Progress {
                block: index + 1,
                blocks,
                bytes_sent: offset,
                total,
            });
        }

        debug!("Upload complete ({total} bytes in {blocks} blocks)");
        Ok(())
    }
}

/// Send one upload over `conn` without validating the payload size.
pub fn send<W, F>(
    conn: &mut W,
    command: Command,
    payload: &[u8],
    progress: F,
) -> Result<(), TransferError>
where
    W: WriteExact + ?Sized,
    F: FnMut(Progress),
{
    Uploader::new(conn).send(command, payload, progress)
}

/// Validate the payload size, then send one upload.
///
/// An out-of-range payload is rejected before anything is written.
pub fn upload<W, F>(
    conn: &mut W,
    command: Command,
    payload: &[u8],
    progress: F,
) -> Result<(), TransferError>
where
    W: WriteExact + ?Sized,
    F: FnMut(Progress),
{
    validate_payload_size(payload.len())?;
    send(conn, command, payload, progress)
}
