//! Native serial port backend using the `serialport` crate.
//!
//! Opens the USB Gecko through the operating system's FTDI driver
//! (`ftdi_sio` on Linux, `AppleUSBFTDI` on macOS, a COM port on Windows).

use {
    crate::port::{Port, port_closed},
    log::{debug, trace},
    serialport::{ClearBuffer, DataBits, FlowControl, Parity, StopBits},
    std::{
        io::{self, Read, Write},
        time::Duration,
    },
};

/// Native serial port implementation.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
}

impl NativePort {
    /// Open a serial port for raw 8-bit transfer with RTS/CTS flow control.
    ///
    /// `serialport` configures the line in raw mode, so there is no line
    /// discipline and no special-character handling.
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> io::Result<Self> {
        debug!("Opening serial port {path} at {baud_rate} baud");
        let port = serialport::new(path, baud_rate)
            .timeout(timeout)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::Hardware)
            .open()?;

        Ok(Self {
            port: Some(port),
            name: path.to_string(),
        })
    }

    fn inner_mut(&mut self) -> io::Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(port_closed)
    }
}

impl Port for NativePort {
    fn name(&self) -> &str {
        &self.name
    }

    fn purge(&mut self) -> io::Result<()> {
        trace!("Purging {}", self.name);
        self.inner_mut()?
            .clear(ClearBuffer::All)?;
        Ok(())
    }

    fn drain(&mut self) -> io::Result<()> {
        // tcdrain() on unix, FlushFileBuffers() on Windows
        self.inner_mut()?
            .flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if self
            .port
            .take()
            .is_some()
        {
            debug!("Closed serial port {}", self.name);
        }
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner_mut()?
            .read(buf)
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner_mut()?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner_mut()?
            .flush()
    }
}
