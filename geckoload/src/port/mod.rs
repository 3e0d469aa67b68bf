//! Port abstraction over the USB Gecko link.
//!
//! The USB Gecko is an FTDI FT245 behind a USB connector. It can be reached
//! in two ways, both exposed through the same [`Port`] trait:
//!
//! - **Serial** (`native` feature): the operating system's FTDI serial
//!   driver, opened by path with the `serialport` crate
//! - **FTDI** (`ftdi` feature): the chip itself, claimed over libusb with
//!   the `rusb` crate, identified by VID/PID
//!
//! ## Architecture
//!
//! ```text
//! +------------------+
//! |  Upload Protocol |
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |    Connection    |   chunking, drain, error mapping
//! +--------+---------+
//!          |
//!          v
//! +--------+---------+
//! |    Port Trait    |
//! +----+--------+----+
//!      |        |
//!      v        v
//! +----+---+ +--+-----+
//! | Native | |  FTDI  |
//! |(serial)| | (rusb) |
//! +--------+ +--------+
//! ```
//!
//! The backend is picked at runtime from a [`Backend`] value, so both
//! variants go through the same connection code and the same test harness.

#[cfg(feature = "native")]
pub mod native;

#[cfg(feature = "ftdi")]
pub mod ftdi;

use std::io::{self, Read, Write};
use std::time::Duration;

/// Default baud rate for the serial backend.
///
/// The FT245 is a parallel FIFO, so the rate is not used on the wire, but
/// serial drivers still require one.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default read/write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default USB vendor ID of the USB Gecko (FTDI).
pub const DEFAULT_FTDI_VID: u16 = 0x0403;

/// Default USB product ID of the USB Gecko (FT245R/FT232R).
pub const DEFAULT_FTDI_PID: u16 = 0x6001;

/// Backend kind, without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum BackendKind {
    /// Operating system serial driver.
    #[default]
    Serial,
    /// FTDI chip over libusb.
    Ftdi,
}

impl BackendKind {
    /// Get the backend kind from a string name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "serial" | "tty" | "native" => Some(Self::Serial),
            "ftdi" | "libusb" | "usb" => Some(Self::Ftdi),
            _ => None,
        }
    }

    /// Get the canonical name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Serial => "serial",
            Self::Ftdi => "ftdi",
        }
    }
}

/// Concrete backend selection with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Serial device opened by path (e.g. `/dev/ttyUSB0`, `COM3`).
    Serial {
        /// Device path.
        path: String,
        /// Baud rate.
        baud_rate: u32,
    },
    /// FTDI chip opened by USB identifier. No path is involved.
    Ftdi {
        /// USB vendor ID.
        vid: u16,
        /// USB product ID.
        pid: u16,
    },
}

impl Backend {
    /// Serial backend at the default baud rate.
    pub fn serial(path: impl Into<String>) -> Self {
        Self::Serial {
            path: path.into(),
            baud_rate: DEFAULT_BAUD,
        }
    }

    /// FTDI backend with the default USB Gecko identifiers.
    pub fn ftdi() -> Self {
        Self::Ftdi {
            vid: DEFAULT_FTDI_VID,
            pid: DEFAULT_FTDI_PID,
        }
    }

    /// Kind of this backend.
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Serial { .. } => BackendKind::Serial,
            Self::Ftdi { .. } => BackendKind::Ftdi,
        }
    }

    /// Human-readable device description, used in logs and errors.
    pub fn describe(&self) -> String {
        match self {
            Self::Serial { path, .. } => path.clone(),
            Self::Ftdi { vid, pid } => format!("ftdi:{vid:04x}:{pid:04x}"),
        }
    }
}

/// Port configuration.
#[derive(Debug, Clone)]
pub struct PortConfig {
    /// Backend to open.
    pub backend: Backend,
    /// Read/write timeout for a single underlying call.
    pub timeout: Duration,
}

impl PortConfig {
    /// Create a new configuration for the given backend.
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Open the configured backend.
    ///
    /// Backends compiled out by cargo features fail with
    /// [`io::ErrorKind::Unsupported`].
    pub fn open(&self) -> io::Result<Box<dyn Port>> {
        match &self.backend {
            #[cfg(feature = "native")]
            Backend::Serial { path, baud_rate } => {
                let port = native::NativePort::open(path, *baud_rate, self.timeout)?;
                Ok(Box::new(port))
            },
            #[cfg(feature = "ftdi")]
            Backend::Ftdi { vid, pid } => {
                let port = ftdi::FtdiPort::open(*vid, *pid, self.timeout)?;
                Ok(Box::new(port))
            },
            #[allow(unreachable_patterns)]
            other => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!(
                    "{} backend support is not compiled in",
                    other
                        .kind()
                        .name()
                ),
            )),
        }
    }
}

/// Byte-stream capability of one USB Gecko backend.
///
/// `read` and `write` come from [`Read`] and [`Write`] and may transfer fewer
/// bytes than requested; the connection layer handles looping and chunking.
pub trait Port: Read + Write + Send {
    /// Get the device name/path.
    fn name(&self) -> &str;

    /// Discard unsent output and unread input.
    fn purge(&mut self) -> io::Result<()>;

    /// Block until previously written bytes have left the host.
    fn drain(&mut self) -> io::Result<()> {
        Write::flush(self)
    }

    /// Close the port and release resources.
    ///
    /// Closing an already closed port is a no-op.
    fn close(&mut self) -> io::Result<()>;
}

impl<P: Port + ?Sized> Port for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn purge(&mut self) -> io::Result<()> {
        (**self).purge()
    }

    fn drain(&mut self) -> io::Result<()> {
        (**self).drain()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Error for an operation on a port that has been closed.
pub(crate) fn port_closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "port closed")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_from_name() {
        assert_eq!(BackendKind::from_name("serial"), Some(BackendKind::Serial));
        assert_eq!(BackendKind::from_name("TTY"), Some(BackendKind::Serial));
        assert_eq!(BackendKind::from_name("ftdi"), Some(BackendKind::Ftdi));
        assert_eq!(BackendKind::from_name("libusb"), Some(BackendKind::Ftdi));
        assert_eq!(BackendKind::from_name("bluetooth"), None);
    }

    #[test]
    fn test_backend_defaults() {
        assert_eq!(
            Backend::serial("/dev/ttyUSB0"),
            Backend::Serial {
                path: "/dev/ttyUSB0".to_string(),
                baud_rate: DEFAULT_BAUD,
            }
        );
        assert_eq!(
            Backend::ftdi(),
            Backend::Ftdi {
                vid: 0x0403,
                pid: 0x6001,
            }
        );
    }

    #[test]
    fn test_backend_describe() {
        assert_eq!(Backend::serial("COM3").describe(), "COM3");
        assert_eq!(Backend::ftdi().describe(), "ftdi:0403:6001");
        assert_eq!(Backend::ftdi().kind(), BackendKind::Ftdi);
    }

    #[test]
    fn test_port_config_builder() {
        let config = PortConfig::new(Backend::serial("/dev/ttyUSB0"))
            .with_timeout(Duration::from_secs(5));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.backend.kind(), BackendKind::Serial);
    }

    #[cfg(feature = "native")]
    #[test]
    fn test_open_missing_serial_device_fails() {
        let config = PortConfig::new(Backend::serial("/nonexistent/geckoload-tty"));
        assert!(config.open().is_err());
    }
}
