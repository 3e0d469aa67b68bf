//! Error types for geckoload.

use std::io;
use thiserror::Error;

use crate::protocol::TransferPhase;

/// Result type for geckoload operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Transport-level failure.
///
/// Every variant is fatal for the operation that produced it. Nothing in the
/// transport retries.
#[derive(Debug, Error)]
pub enum IoError {
    /// The device could not be opened, configured or queried.
    #[error("failed to open {device}: {source}")]
    OpenFailed {
        /// Device path or USB identifier.
        device: String,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// An underlying read returned no data or failed.
    #[error("read failed after {offset} of {requested} bytes: {source}")]
    ReadFailed {
        /// Bytes already received by this call.
        offset: usize,
        /// Bytes requested by this call.
        requested: usize,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },

    /// An underlying write accepted no data, failed, or could not be drained.
    #[error("write failed after {offset} of {requested} bytes: {source}")]
    WriteFailed {
        /// Bytes already sent by this call.
        offset: usize,
        /// Bytes requested by this call.
        requested: usize,
        /// Underlying cause.
        #[source]
        source: io::Error,
    },
}

impl IoError {
    /// Get the underlying I/O error.
    pub fn io_error(&self) -> &io::Error {
        match self {
            Self::OpenFailed { source, .. }
            | Self::ReadFailed { source, .. }
            | Self::WriteFailed { source, .. } => source,
        }
    }
}

/// Upload protocol failure.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Payload length outside `1..=max`.
    #[error("invalid payload size: {size} bytes (must be 1..={max})")]
    InvalidPayloadSize {
        /// Offending size.
        size: usize,
        /// Largest accepted size.
        max: usize,
    },

    /// The transport failed while sending part of the upload.
    #[error("transfer failed while sending {phase}: {source}")]
    Transport {
        /// Which part of the upload was in flight.
        phase: TransferPhase,
        /// Transport error.
        #[source]
        source: IoError,
    },
}

impl TransferError {
    /// Phase during which the transport failed, if this is a transport error.
    pub fn phase(&self) -> Option<TransferPhase> {
        match self {
            Self::Transport { phase, .. } => Some(*phase),
            Self::InvalidPayloadSize { .. } => None,
        }
    }
}

/// Error type for geckoload operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Transport error outside of a transfer (open, flush).
    #[error(transparent)]
    Transport(#[from] IoError),

    /// Upload failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// No usable device path.
    #[error("device not found: set {var} to your USB Gecko device (e.g. {example})")]
    DeviceNotFound {
        /// Environment variable consulted.
        var: &'static str,
        /// Example value for this platform.
        example: &'static str,
    },

    /// An explicitly requested device path does not exist.
    #[error("device {path} does not exist")]
    NoSuchDevice {
        /// Path from the command line or config file.
        path: String,
    },
}
