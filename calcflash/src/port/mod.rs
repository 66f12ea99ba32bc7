//! Byte channel abstraction over the serial link.
//!
//! The protocol layers only ever talk to a [`Port`]: open/close the line,
//! write bytes, and read a bounded number of bytes within a timeout. A read
//! that times out is not an error at this level; it simply yields fewer bytes
//! than requested and the protocol layer decides what that means.
//!
//! ```text
//! +--------------------+
//! |  Session / Link    |
//! |  xsend / stream    |
//! +---------+----------+
//!           |
//!           v
//! +---------+----------+
//! |     Port trait     |
//! +---------+----------+
//!           |
//!           v
//! +---------+----------+
//! | NativePort         |
//! |   (serialport)     |
//! +--------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use log::trace;

use crate::error::Result;

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Default read/write timeout.
    pub timeout: Duration,
    /// Data bits (typically 8).
    pub data_bits: DataBits,
    /// Parity (typically None).
    pub parity: Parity,
    /// Stop bits (typically One).
    pub stop_bits: StopBits,
    /// Flow control (typically None).
    pub flow_control: FlowControl,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 115200,
            timeout: Duration::from_millis(1000),
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the default timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Number of data bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataBits {
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    /// No parity.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
}

/// Number of stop bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 2 stop bits.
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,
    /// Hardware flow control (RTS/CTS).
    Hardware,
}

/// Serial port information.
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// Half-duplex byte channel to the target.
///
/// A port is created closed. The session opens it once, the handshake closes
/// and reopens it between the wake-up and ping sequences, and the session
/// closes it on every exit path.
pub trait Port: Read + Write + Send {
    /// Open the underlying connection. Opening an open port is a no-op.
    fn open(&mut self) -> Result<()>;

    /// Close the connection. Closing a closed port is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Whether the connection is currently open.
    fn is_open(&self) -> bool;

    /// Set the read/write timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Get the current timeout.
    fn timeout(&self) -> Duration;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Write all bytes and flush, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        trace!("TX {} bytes", buf.len());
        Write::write_all(self, buf)?;
        Write::flush(self)?;
        Ok(())
    }

    /// Read up to `len` bytes, giving up once `timeout` elapses without data.
    ///
    /// Returns fewer than `len` bytes (possibly none) on timeout.
    fn read_bytes(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        self.set_timeout(timeout)?;

        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    break;
                },
                Err(e) => return Err(e.into()),
            }
        }
        buf.truncate(filled);

        trace!("RX {filled}/{len} bytes: {buf:02X?}");
        Ok(buf)
    }
}

/// Trait for listing available serial ports.
///
/// This is separated from `Port` because it's a static operation that
/// doesn't require a port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
