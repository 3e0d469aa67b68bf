//! In-memory payload images.

use crate::error::Result;
use crate::protocol::{BLOCK_SIZE, validate_payload_size};
use log::debug;
use std::fs;
use std::path::Path;

/// A binary image ready for upload.
///
/// The length is always in `1..=MAX_PAYLOAD_SIZE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    data: Vec<u8>,
}

impl Payload {
    /// Wrap bytes, rejecting empty or oversized images.
    pub fn new(data: Vec<u8>) -> Result<Self> {
        validate_payload_size(data.len())?;
        Ok(Self { data })
    }

    /// Load a whole file into memory.
    ///
    /// The size is checked from metadata before the file is read, so an
    /// oversized file is never loaded.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let size = fs::metadata(path)?.len();
        validate_payload_size(usize::try_from(size).unwrap_or(usize::MAX))?;

        let data = fs::read(path)?;
        debug!("Loaded {} ({} bytes)", path.display(), data.len());
        // The file may have changed between stat and read
        Self::new(data)
    }

    /// Payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.data
            .len()
    }

    /// Always `false`; kept for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.data
            .is_empty()
    }

    /// Number of protocol blocks needed to send this payload.
    pub fn block_count(&self) -> usize {
        self.len()
            .div_ceil(BLOCK_SIZE)
    }

    /// Consume the payload and return the bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl TryFrom<Vec<u8>> for Payload {
    type Error = crate::error::Error;

    fn try_from(data: Vec<u8>) -> Result<Self> {
        Self::new(data)
    }
}
