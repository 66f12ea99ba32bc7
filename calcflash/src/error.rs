//! Error types for calcflash.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type for calcflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol step an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Wake-up and ping handshake.
    Connect,
    /// Hardware register configuration.
    InitialInstructions,
    /// `S` command announcing the receiving program upload.
    LoaderUpload,
    /// One 128-byte packet of the receiving program (1-based sequence number).
    LoaderPacket(usize),
    /// End-of-transmission after the receiving program.
    LoaderEnd,
    /// `G` command starting the receiving program.
    Execute,
    /// One firmware chunk (0-based index).
    FirmwareChunk(usize),
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::InitialInstructions => write!(f, "initial instructions"),
            Self::LoaderUpload => write!(f, "transfer program"),
            Self::LoaderPacket(n) => write!(f, "transfer program packet {n}"),
            Self::LoaderEnd => write!(f, "transfer program end of transmission"),
            Self::Execute => write!(f, "execute command"),
            Self::FirmwareChunk(i) => write!(f, "firmware packet {i}"),
        }
    }
}

/// Error type for calcflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Firmware file missing, unreadable or empty.
    #[error("Invalid firmware: {0}")]
    InvalidFirmware(String),

    /// Receiving program missing, empty or too large.
    #[error("Invalid transfer program: {0}")]
    InvalidLoader(String),

    /// The target answered with something other than the expected acknowledgement.
    #[error("{message}")]
    Protocol {
        /// Step that failed.
        phase: Phase,
        /// Human-readable description.
        message: String,
        /// Raw bytes received instead of the acknowledgement.
        response: Vec<u8>,
    },

    /// The target did not answer within the read window.
    #[error("No answer to {phase}")]
    Timeout {
        /// Step that failed.
        phase: Phase,
    },

    /// The embedding application requested an interruption.
    #[error("Operation cancelled")]
    Cancelled,

    /// No serial device found.
    #[error("No serial device found")]
    DeviceNotFound,
}

impl Error {
    /// Build a protocol error for `phase`.
    pub fn protocol(phase: Phase, message: impl Into<String>, response: &[u8]) -> Self {
        Self::Protocol {
            phase,
            message: message.into(),
            response: response.to_vec(),
        }
    }

    /// Protocol step this error belongs to, if any.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Self::Protocol { phase, .. } | Self::Timeout { phase } => Some(*phase),
            _ => None,
        }
    }

    /// Unexpected bytes received from the target, if any.
    pub fn response(&self) -> Option<&[u8]> {
        match self {
            Self::Protocol { response, .. } if !response.is_empty() => Some(response),
            _ => None,
        }
    }

    /// Whether the error was raised before any serial I/O took place.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidFirmware(_) | Self::InvalidLoader(_))
    }
}
