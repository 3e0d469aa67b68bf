//! # geckoload
//!
//! Upload ARM and PPC binaries to BootMii through a USB Gecko.
//!
//! The crate has two layers:
//!
//! - [`transport`]: a [`Connection`] that reads and writes exact byte counts
//!   over a flow-controlled link, in chunks no larger than [`MAX_CHUNK`]
//! - [`protocol`]: the upload framing, a 4-byte command tag, a big-endian
//!   length and the payload in [`BLOCK_SIZE`] blocks
//!
//! The device never replies. An upload either completes locally or fails
//! with an I/O error.
//!
//! ## Backends
//!
//! - `native` (default): the kernel tty driver via the `serialport` crate
//! - `ftdi` (default): the FT245R chip directly via `rusb`
//!
//! ## Features
//!
//! - `native`: serial port backend
//! - `ftdi`: libusb backend
//! - `serde`: Serialization support for configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use geckoload::{Command, Connection, Payload, PortConfig, Backend};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let payload = Payload::from_file("ppcboot.elf")?;
//!
//!     let config = PortConfig::new(Backend::serial("/dev/ttyUSB0"));
//!     let mut conn = Connection::open(&config)?;
//!
//!     geckoload::upload(&mut conn, Command::UploadPpc, payload.as_bytes(), |p| {
//!         println!("{}/{} bytes", p.bytes_sent, p.total);
//!     })?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod transport;

#[cfg(feature = "ftdi")]
pub use port::ftdi::FtdiPort;
#[cfg(feature = "native")]
pub use port::native::NativePort;
pub use {
    device::{DEVICE_ENV_VAR, resolve_device},
    error::{Error, IoError, Result, TransferError},
    image::Payload,
    port::{Backend, BackendKind, Port, PortConfig},
    protocol::{
        BLOCK_SIZE, Command, MAX_PAYLOAD_SIZE, Progress, TransferPhase, Uploader, send, upload,
    },
    transport::{Connection, ConnectionOptions, MAX_CHUNK, WriteExact},
};
