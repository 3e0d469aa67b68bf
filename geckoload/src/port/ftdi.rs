//! Direct FTDI backend using the `rusb` crate.
//!
//! Talks to the USB Gecko's FT245R over libusb instead of the kernel serial
//! driver. The device is selected by VID/PID; there is no path.
//!
//! ## Bulk IN framing
//!
//! Every bulk IN packet from the chip starts with two modem status bytes,
//! even when it carries no data:
//!
//! ```text
//! +--------+--------+----------------------+
//! | STAT 0 | STAT 1 |  DATA (0..=62 bytes) |
//! +--------+--------+----------------------+
//! ```
//!
//! [`strip_status_bytes`] removes them before data reaches the caller.

use {
    crate::port::{Port, port_closed},
    log::{debug, trace, warn},
    rusb::{Context, DeviceHandle, Direction, Recipient, RequestType, UsbContext},
    std::{
        collections::VecDeque,
        io::{self, Read, Write},
        thread,
        time::{Duration, Instant},
    },
};

/// Bulk OUT endpoint of FT232R/FT245R.
const WRITE_ENDPOINT: u8 = 0x02;

/// Bulk IN endpoint of FT232R/FT245R.
const READ_ENDPOINT: u8 = 0x81;

/// Interface claimed on the device.
const INTERFACE: u8 = 0;

/// `wIndex` for vendor requests addressed to interface A.
const INTERFACE_A_INDEX: u16 = 1;

/// Full-speed bulk packet size.
pub const PACKET_SIZE: usize = 64;

/// Modem status bytes at the start of every bulk IN packet.
pub const STATUS_BYTES: usize = 2;

/// Staging buffer size for bulk reads, a whole number of packets.
const READ_BUFFER_SIZE: usize = PACKET_SIZE * 64;

/// Timeout for vendor control requests.
const CONTROL_TIMEOUT: Duration = Duration::from_millis(1000);

/// Latency timer in milliseconds.
const LATENCY_TIMER_MS: u16 = 16;

/// Delay between modem status polls while draining.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

// Vendor requests
const SIO_RESET_REQUEST: u8 = 0x00;
const SIO_SET_FLOW_CTRL_REQUEST: u8 = 0x02;
const SIO_POLL_MODEM_STATUS_REQUEST: u8 = 0x05;
const SIO_SET_LATENCY_TIMER_REQUEST: u8 = 0x09;

// SIO_RESET_REQUEST values
const SIO_RESET_SIO: u16 = 0;
const SIO_RESET_PURGE_RX: u16 = 1;
const SIO_RESET_PURGE_TX: u16 = 2;

/// RTS/CTS handshake, placed in the high byte of `wIndex`.
const SIO_RTS_CTS_HS: u16 = 0x1 << 8;

/// Line status bit: transmitter holding and shift registers empty.
const LINE_STATUS_TEMT: u8 = 0x40;

/// FTDI chip accessed through libusb.
pub struct FtdiPort {
    handle: Option<DeviceHandle<Context>>,
    name: String,
    timeout: Duration,
    pending: VecDeque<u8>,
    raw: Vec<u8>,
}

impl FtdiPort {
    /// Open the first device matching `vid:pid` and configure it for raw
    /// flow-controlled transfer.
    pub fn open(vid: u16, pid: u16, timeout: Duration) -> io::Result<Self> {
        let name = format!("ftdi:{vid:04x}:{pid:04x}");
        debug!("Opening {name}");

        let context = Context::new().map_err(usb_error)?;
        let handle = context
            .open_device_with_vid_pid(vid, pid)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no USB device with VID {vid:04x} PID {pid:04x}"),
                )
            })?;

        match handle.kernel_driver_active(INTERFACE) {
            Ok(true) => match handle.detach_kernel_driver(INTERFACE) {
                Ok(()) => trace!("Detached kernel driver from interface {INTERFACE}"),
                Err(e) => trace!("Could not detach kernel driver: {e:?}"),
            },
            Ok(false) => trace!("No kernel driver active on interface {INTERFACE}"),
            Err(e) => trace!("Could not query kernel driver status: {e:?}"),
        }

        handle
            .claim_interface(INTERFACE)
            .map_err(usb_error)?;

        let port = Self {
            handle: Some(handle),
            name,
            timeout,
            pending: VecDeque::new(),
            raw: vec![0u8; READ_BUFFER_SIZE],
        };

        port.vendor_request(SIO_RESET_REQUEST, SIO_RESET_SIO, INTERFACE_A_INDEX)?;
        port.vendor_request(
            SIO_SET_FLOW_CTRL_REQUEST,
            0,
            SIO_RTS_CTS_HS | INTERFACE_A_INDEX,
        )?;
        port.vendor_request(
            SIO_SET_LATENCY_TIMER_REQUEST,
            LATENCY_TIMER_MS,
            INTERFACE_A_INDEX,
        )?;

        Ok(port)
    }

    fn handle(&self) -> io::Result<&DeviceHandle<Context>> {
        self.handle
            .as_ref()
            .ok_or_else(port_closed)
    }

    fn vendor_request(&self, request: u8, value: u16, index: u16) -> io::Result<()> {
        let request_type = rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device);
        self.handle()?
            .write_control(request_type, request, value, index, &[], CONTROL_TIMEOUT)
            .map_err(usb_error)?;
        Ok(())
    }

    fn poll_modem_status(&self) -> io::Result<[u8; STATUS_BYTES]> {
        let request_type = rusb::request_type(Direction::In, RequestType::Vendor, Recipient::Device);
        let mut status = [0u8; STATUS_BYTES];
        let n = self
            .handle()?
            .read_control(
                request_type,
                SIO_POLL_MODEM_STATUS_REQUEST,
                0,
                INTERFACE_A_INDEX,
                &mut status,
                CONTROL_TIMEOUT,
            )
            .map_err(usb_error)?;
        if n < STATUS_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("short modem status reply ({n} bytes)"),
            ));
        }
        Ok(status)
    }
}

impl Port for FtdiPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn purge(&mut self) -> io::Result<()> {
        trace!("Purging {}", self.name);
        self.pending
            .clear();
        self.vendor_request(SIO_RESET_REQUEST, SIO_RESET_PURGE_RX, INTERFACE_A_INDEX)?;
        self.vendor_request(SIO_RESET_REQUEST, SIO_RESET_PURGE_TX, INTERFACE_A_INDEX)
    }

    fn drain(&mut self) -> io::Result<()> {
        // The chip still holds bytes after the bulk transfer completes
        let deadline = Instant::now() + self.timeout;
        loop {
            let status = self.poll_modem_status()?;
            if transmitter_empty(&status) {
                trace!("{} drained", self.name);
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "transmitter did not drain",
                ));
            }
            thread::sleep(DRAIN_POLL_INTERVAL);
        }
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(handle) = self
            .handle
            .take()
        {
            if let Err(e) = handle.release_interface(INTERFACE) {
                warn!("Failed to release interface on {}: {e}", self.name);
            }
            debug!("Closed {}", self.name);
        }
        Ok(())
    }
}

impl Read for FtdiPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        // Status-only packets arrive every latency period while the device
        // is idle; keep polling until data shows up or the timeout expires.
        let deadline = Instant::now() + self.timeout;
        while self
            .pending
            .is_empty()
        {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "no data from device"));
            }

            let handle = self
                .handle
                .as_ref()
                .ok_or_else(port_closed)?;
            let n = handle
                .read_bulk(READ_ENDPOINT, &mut self.raw, remaining)
                .map_err(usb_error)?;

            let mut data = Vec::with_capacity(n);
            strip_status_bytes(&self.raw[..n], PACKET_SIZE, &mut data);
            self.pending
                .extend(data);
        }

        let n = buf
            .len()
            .min(
                self.pending
                    .len(),
            );
        for (dst, src) in buf
            .iter_mut()
            .zip(
                self.pending
                    .drain(..n),
            )
        {
            *dst = src;
        }
        Ok(n)
    }
}

impl Write for FtdiPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let timeout = self.timeout;
        self.handle()?
            .write_bulk(WRITE_ENDPOINT, buf, timeout)
            .map_err(usb_error)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for FtdiPort {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Append the payload of a raw bulk IN transfer to `out`, dropping the
/// status bytes that lead each `packet_size`-byte packet.
pub fn strip_status_bytes(raw: &[u8], packet_size: usize, out: &mut Vec<u8>) {
    for packet in raw.chunks(packet_size) {
        if packet.len() > STATUS_BYTES {
            out.extend_from_slice(&packet[STATUS_BYTES..]);
        }
    }
}

/// Whether a modem status reply reports the transmitter as empty.
///
/// The second byte is the line status; a reply shorter than two bytes
/// never counts as empty.
pub fn transmitter_empty(status: &[u8]) -> bool {
    status
        .get(1)
        .is_some_and(|line| line & LINE_STATUS_TEMT != 0)
}

fn usb_error(e: rusb::Error) -> io::Error {
    let kind = match e {
        rusb::Error::Timeout => io::ErrorKind::TimedOut,
        rusb::Error::NoDevice => io::ErrorKind::NotConnected,
        rusb::Error::NotFound => io::ErrorKind::NotFound,
        rusb::Error::Access => io::ErrorKind::PermissionDenied,
        rusb::Error::Busy => io::ErrorKind::ResourceBusy,
        rusb::Error::Interrupted => io::ErrorKind::Interrupted,
        rusb::Error::NotSupported => io::ErrorKind::Unsupported,
        _ => io::ErrorKind::Other,
    };
    io::Error::new(kind, e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_status_only_packet() {
        let mut out = Vec::new();
        strip_status_bytes(&[0x31, 0x60], PACKET_SIZE, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_strip_single_partial_packet() {
        let mut out = Vec::new();
        strip_status_bytes(&[0x31, 0x60, b'B', b'A', b'R', b'M'], PACKET_SIZE, &mut out);
        assert_eq!(out, b"BARM");
    }

    #[test]
    fn test_strip_multiple_packets() {
        // Two full packets and a short third one
        let mut raw = Vec::new();
        for fill in [0xAAu8, 0xBB] {
            raw.extend_from_slice(&[0x31, 0x60]);
            raw.extend(std::iter::repeat_n(fill, PACKET_SIZE - STATUS_BYTES));
        }
        raw.extend_from_slice(&[0x31, 0x60, 0xCC, 0xDD]);

        let mut out = Vec::new();
        strip_status_bytes(&raw, PACKET_SIZE, &mut out);

        assert_eq!(out.len(), 2 * (PACKET_SIZE - STATUS_BYTES) + 2);
        assert!(out[..62].iter().all(|&b| b == 0xAA));
        assert!(out[62..124].iter().all(|&b| b == 0xBB));
        assert_eq!(&out[124..], &[0xCC, 0xDD]);
    }

    #[test]
    fn test_transmitter_empty() {
        // Idle chip: THRE and TEMT set
        assert!(transmitter_empty(&[0x31, 0x60]));
        assert!(transmitter_empty(&[0x00, LINE_STATUS_TEMT]));
        // Holding register free but shift register still busy
        assert!(!transmitter_empty(&[0x31, 0x20]));
        // TEMT lives in the second byte only
        assert!(!transmitter_empty(&[0x40, 0x00]));
        assert!(!transmitter_empty(&[0x31]));
        assert!(!transmitter_empty(&[]));
    }

    #[test]
    fn test_usb_error_mapping() {
        assert_eq!(usb_error(rusb::Error::Timeout).kind(), io::ErrorKind::TimedOut);
        assert_eq!(usb_error(rusb::Error::Access).kind(), io::ErrorKind::PermissionDenied);
        assert_eq!(usb_error(rusb::Error::NoDevice).kind(), io::ErrorKind::NotConnected);
        assert_eq!(usb_error(rusb::Error::Pipe).kind(), io::ErrorKind::Other);
    }
}
