//! Native serial port implementation using the `serialport` crate.
//!
//! This module provides the serial port implementation for native platforms
//! (Linux, macOS, Windows, FreeBSD, etc.).

use {
    crate::{
        error::{Error, Result},
        port::{
            DataBits, FlowControl, Parity, Port, PortEnumerator, PortInfo, SerialConfig, StopBits,
        },
    },
    log::{debug, trace},
    std::{
        io::{self, Read, Write},
        time::Duration,
    },
};

/// Native serial port implementation.
///
/// Holds its configuration so the connection can be closed and reopened
/// with identical line settings.
pub struct NativePort {
    port: Option<Box<dyn serialport::SerialPort>>,
    config: SerialConfig,
    timeout: Duration,
}

impl NativePort {
    /// Create a closed port for the given configuration.
    pub fn new(config: SerialConfig) -> Self {
        let timeout = config.timeout;
        Self {
            port: None,
            config,
            timeout,
        }
    }

    /// Create a closed port with default line settings.
    pub fn with_name(port_name: &str, baud_rate: u32) -> Self {
        Self::new(SerialConfig::new(port_name, baud_rate))
    }

    fn not_connected() -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, "port closed")
    }
}

impl Port for NativePort {
    fn open(&mut self) -> Result<()> {
        if self.port.is_some() {
            return Ok(());
        }

        debug!(
            "Opening {} at {} baud",
            self.config.port_name, self.config.baud_rate
        );
        let port = serialport::new(&self.config.port_name, self.config.baud_rate)
            .timeout(self.timeout)
            .data_bits(self.config.data_bits.into())
            .parity(self.config.parity.into())
            .stop_bits(self.config.stop_bits.into())
            .flow_control(self.config.flow_control.into())
            .open()?;

        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.port.take().is_some() {
            trace!("Closed {}", self.config.port_name);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        if let Some(ref mut p) = self.port {
            if p.timeout() != timeout {
                p.set_timeout(timeout)?;
            }
        }
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn name(&self) -> &str {
        &self.config.port_name
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(Self::not_connected)
            .and_then(|p| p.read(buf))
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port
            .as_mut()
            .ok_or_else(Self::not_connected)
            .and_then(|p| p.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port
            .as_mut()
            .ok_or_else(Self::not_connected)
            .and_then(|p| p.flush())
    }
}

/// Native port enumerator.
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports() -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(Error::Serial)?;

        Ok(ports
            .into_iter()
            .map(|p| match p.port_type {
                serialport::SerialPortType::UsbPort(info) => PortInfo {
                    name: p.port_name,
                    vid: Some(info.vid),
                    pid: Some(info.pid),
                    manufacturer: info.manufacturer,
                    product: info.product,
                    serial_number: info.serial_number,
                },
                _ => PortInfo {
                    name: p.port_name,
                    vid: None,
                    pid: None,
                    manufacturer: None,
                    product: None,
                    serial_number: None,
                },
            })
            .collect())
    }
}

// Type conversions from our types to serialport types

impl From<DataBits> for serialport::DataBits {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Seven => Self::Seven,
            DataBits::Eight => Self::Eight,
        }
    }
}

impl From<Parity> for serialport::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => Self::None,
            Parity::Odd => Self::Odd,
            Parity::Even => Self::Even,
        }
    }
}

impl From<StopBits> for serialport::StopBits {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => Self::One,
            StopBits::Two => Self::Two,
        }
    }
}

impl From<FlowControl> for serialport::FlowControl {
    fn from(flow: FlowControl) -> Self {
        match flow {
            FlowControl::None => Self::None,
            FlowControl::Hardware => Self::Hardware,
        }
    }
}
