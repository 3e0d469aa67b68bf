//! Chunked, all-or-nothing transport over a USB Gecko [`Port`].
//!
//! A [`Connection`] owns exactly one open port. Every request is split into
//! chunks of at most [`MAX_CHUNK`] bytes before it reaches the backend, and
//! each chunk write is drained onto the wire before the next one starts,
//! because the receiving side has no buffering guarantee.
//!
//! Reads and writes either move every requested byte or fail. Any underlying
//! call that returns an error or zero bytes aborts the whole request; nothing
//! is retried.
//!
//! ## Example
//!
//! ```rust,no_run
//! use geckoload::port::{Backend, PortConfig};
//! use geckoload::transport::Connection;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut conn = Connection::open(&PortConfig::new(Backend::serial("/dev/ttyUSB0")))?;
//!     conn.write_exact(b"BARM")?;
//!     conn.close();
//!     Ok(())
//! }
//! ```

use crate::error::IoError;
use crate::port::{Port, PortConfig, port_closed};
use log::{debug, trace, warn};
use std::io;

/// Largest single transfer handed to a backend, set by the FTDI USB packet
/// buffer.
pub const MAX_CHUNK: usize = 3968;

/// Connection tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Largest single underlying read or write. Clamped to `1..=MAX_CHUNK`
    /// when the connection is created.
    pub max_chunk: usize,
    /// Drain the port after every chunk write.
    pub drain_after_write: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            max_chunk: MAX_CHUNK,
            drain_after_write: true,
        }
    }
}

impl ConnectionOptions {
    /// Enable or disable draining after each chunk write.
    #[must_use]
    pub fn with_drain_after_write(mut self, drain: bool) -> Self {
        self.drain_after_write = drain;
        self
    }
}

/// An open link to the USB Gecko.
///
/// Dropping the connection closes the port.
pub struct Connection {
    port: Option<Box<dyn Port>>,
    name: String,
    options: ConnectionOptions,
}

impl Connection {
    /// Open the configured backend with default options.
    pub fn open(config: &PortConfig) -> Result<Self, IoError> {
        Self::open_with_options(config, ConnectionOptions::default())
    }

    /// Open the configured backend and flush both directions.
    pub fn open_with_options(
        config: &PortConfig,
        options: ConnectionOptions,
    ) -> Result<Self, IoError> {
        let device = config
            .backend
            .describe();
        debug!("Opening {device} ({})", config.backend.kind().name());

        let port = config
            .open()
            .map_err(|source| IoError::OpenFailed {
                device: device.clone(),
                source,
            })?;

        Self::attach(port, device, options)
    }

    /// Wrap an already opened port.
    ///
    /// The port is flushed exactly as [`Connection::open`] does.
    pub fn from_port<P: Port + 'static>(
        port: P,
        options: ConnectionOptions,
    ) -> Result<Self, IoError> {
        let name = port
            .name()
            .to_string();
        Self::attach(Box::new(port), name, options)
    }

    fn attach(
        port: Box<dyn Port>,
        name: String,
        options: ConnectionOptions,
    ) -> Result<Self, IoError> {
        let options = ConnectionOptions {
            max_chunk: options
                .max_chunk
                .clamp(1, MAX_CHUNK),
            ..options
        };
        let mut conn = Self {
            port: Some(port),
            name,
            options,
        };

        conn.flush()?;

        debug!("Connection to {} ready", conn.name);
        Ok(conn)
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the connection options.
    pub fn options(&self) -> ConnectionOptions {
        self.options
    }

    /// Whether the connection still holds an open port.
    pub fn is_open(&self) -> bool {
        self.port
            .is_some()
    }

    /// Discard pending bytes in both directions.
    pub fn flush(&mut self) -> Result<(), IoError> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| IoError::OpenFailed {
                device: self
                    .name
                    .clone(),
                source: port_closed(),
            })?;
        trace!("Flushing {}", self.name);
        port.purge()
            .map_err(|source| IoError::OpenFailed {
                device: self
                    .name
                    .clone(),
                source,
            })
    }

    /// Fill `buf` completely.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), IoError> {
        let requested = buf.len();
        let max_chunk = self
            .options
            .max_chunk;
        let fail = |offset, source| IoError::ReadFailed {
            offset,
            requested,
            source,
        };

        let Some(port) = self
            .port
            .as_mut()
        else {
            return Err(fail(0, port_closed()));
        };

        let mut offset = 0;
        while offset < requested {
            let end = offset + max_chunk.min(requested - offset);
            match port.read(&mut buf[offset..end]) {
                Ok(0) => {
                    return Err(fail(
                        offset,
                        io::Error::new(io::ErrorKind::UnexpectedEof, "device returned no data"),
                    ));
                },
                Ok(n) => {
                    trace!("Read {n} bytes ({}/{requested})", offset + n);
                    offset += n;
                },
                Err(e) => return Err(fail(offset, e)),
            }
        }

        Ok(())
    }

    /// Write all of `buf`, draining after every chunk.
    pub fn write_exact(&mut self, buf: &[u8]) -> Result<(), IoError> {
        let requested = buf.len();
        let ConnectionOptions {
            max_chunk,
            drain_after_write,
        } = self.options;
        let fail = |offset, source| IoError::WriteFailed {
            offset,
            requested,
            source,
        };

        let Some(port) = self
            .port
            .as_mut()
        else {
            return Err(fail(0, port_closed()));
        };

        let mut offset = 0;
        while offset < requested {
            let end = offset + max_chunk.min(requested - offset);
            match port.write(&buf[offset..end]) {
                Ok(0) => {
                    return Err(fail(
                        offset,
                        io::Error::new(io::ErrorKind::WriteZero, "device accepted no data"),
                    ));
                },
                Ok(n) => {
                    trace!("Wrote {n} bytes ({}/{requested})", offset + n);
                    offset += n;
                },
                Err(e) => return Err(fail(offset, e)),
            }

            if drain_after_write {
                port.drain()
                    .map_err(|e| fail(offset, e))?;
            }
        }

        Ok(())
    }

    /// Close the port.
    ///
    /// Safe to call more than once; later calls do nothing.
    pub fn close(&mut self) {
        if let Some(mut port) = self
            .port
            .take()
        {
            if let Err(e) = port.close() {
                warn!("Error closing {}: {e}", self.name);
            }
            debug!("Connection to {} closed", self.name);
        }
    }
}

/// Exact-length output, the only operation the upload protocol needs.
pub trait WriteExact {
    /// Write all of `buf` or fail.
    fn write_exact(&mut self, buf: &[u8]) -> Result<(), IoError>;
}

impl WriteExact for Connection {
    fn write_exact(&mut self, buf: &[u8]) -> Result<(), IoError> {
        Connection::write_exact(self, buf)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("open", &self.is_open())
            .field("options", &self.options)
            .finish()
    }
}
