//! Serial port discovery.
//!
//! Ports are classified by USB VID/PID so the CLI can pick the boot monitor
//! without being told which port to use.

use crate::error::{Error, Result};
use crate::port::PortInfo;

use log::{info, trace};

/// What is behind a serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DeviceKind {
    /// Atmel SAM-BA boot monitor on the target's own USB port.
    SamBa,
    /// FTDI USB-to-Serial converter.
    Ftdi,
    /// Silicon Labs CP210x USB-to-Serial converter.
    Cp210x,
    /// CH340/CH341 USB-to-Serial converter.
    Ch340,
    /// Prolific PL2303 USB-to-Serial converter.
    Prolific,
    /// Anything else.
    Unknown,
}

const KNOWN_USB_DEVICES: &[(u16, &[u16], DeviceKind)] = &[
    (0x03EB, &[0x6124], DeviceKind::SamBa),
    (0x0403, &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015], DeviceKind::Ftdi),
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71], DeviceKind::Cp210x),
    (0x1A86, &[0x7523, 0x7522, 0x5523], DeviceKind::Ch340),
    (0x067B, &[0x2303, 0x23A3], DeviceKind::Prolific),
];

impl DeviceKind {
    /// Classify a USB VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        KNOWN_USB_DEVICES
            .iter()
            .find(|(known_vid, pids, _)| *known_vid == vid && pids.contains(&pid))
            .map_or(Self::Unknown, |(_, _, kind)| *kind)
    }

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SamBa => "SAM-BA",
            Self::Ftdi => "FTDI",
            Self::Cp210x => "CP210x",
            Self::Ch340 => "CH340/CH341",
            Self::Prolific => "PL2303",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether the VID/PID matched a known entry.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Whether the port talks to the boot monitor directly.
    pub fn is_boot_monitor(&self) -> bool {
        matches!(self, Self::SamBa)
    }
}

/// A classified serial port.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DetectedPort {
    /// Port name or path.
    pub name: String,
    /// Classification.
    pub device: DeviceKind,
    /// USB vendor ID.
    pub vid: Option<u16>,
    /// USB product ID.
    pub pid: Option<u16>,
    /// USB product string.
    pub product: Option<String>,
}

impl From<PortInfo> for DetectedPort {
    fn from(info: PortInfo) -> Self {
        let device = match (info.vid, info.pid) {
            (Some(vid), Some(pid)) => DeviceKind::from_vid_pid(vid, pid),
            _ => DeviceKind::Unknown,
        };
        trace!("{}: {device:?} ({:04X?}:{:04X?})", info.name, info.vid, info.pid);
        Self {
            name: info.name,
            device,
            vid: info.vid,
            pid: info.pid,
            product: info.product,
        }
    }
}

/// Classify every port on the system. Enumeration failures yield an empty
/// list.
#[cfg(feature = "native")]
pub fn detect_ports() -> Vec<DetectedPort> {
    use crate::port::{NativePortEnumerator, PortEnumerator};

    match NativePortEnumerator::list_ports() {
        Ok(ports) => ports.into_iter().map(DetectedPort::from).collect(),
        Err(e) => {
            log::debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// Without a native backend there is nothing to enumerate.
#[cfg(not(feature = "native"))]
pub fn detect_ports() -> Vec<DetectedPort> {
    Vec::new()
}

/// Pick a port: the boot monitor first, then a known bridge, then whatever
/// comes first.
pub fn select_port(ports: &[DetectedPort]) -> Option<&DetectedPort> {
    ports
        .iter()
        .find(|p| p.device.is_boot_monitor())
        .or_else(|| ports.iter().find(|p| p.device.is_known()))
        .or_else(|| ports.first())
}

/// Detect and pick a single port.
pub fn auto_detect_port() -> Result<DetectedPort> {
    let ports = detect_ports();
    let port = select_port(&ports).ok_or(Error::DeviceNotFound)?;
    info!("Auto-detected {} ({})", port.name, port.device.name());
    Ok(port.clone())
}

/// One display line per port.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let device = if port.device.is_known() {
                format!(" [{}]", port.device.name())
            } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" [VID:{vid:04X} PID:{pid:04X}]")
            } else {
                String::new()
            };
            let product = port
                .product
                .as_deref()
                .map(|p| format!(" - {p}"))
                .unwrap_or_default();
            format!("{}{device}{product}", port.name)
        })
        .collect()
}
