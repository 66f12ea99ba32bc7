//! ASCII commands understood by the boot monitor.
//!
//! ```text
//! N#                  switch to binary (non-interactive) mode
//! W<addr>,<value>#    write a 32-bit word
//! w<addr>,<count>#    read <count> bytes back
//! S<addr>,<size>#     receive <size> bytes at <addr> (XMODEM-style)
//! G<addr>#            jump to <addr>
//! ```
//!
//! Addresses, values and sizes are 8 hex digits; read counts are a single
//! hex digit.

use std::fmt;

/// A boot monitor command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCommand {
    /// Ping that also selects binary mode.
    Ping,
    /// Write a word to a register or memory location.
    WriteWord {
        /// Target address.
        address: u32,
        /// Value to store.
        value: u32,
    },
    /// Read `count` bytes from `address`.
    ReadWord {
        /// Source address.
        address: u32,
        /// Number of bytes to read back (single hex digit).
        count: u8,
    },
    /// Announce an upload of `size` bytes to `address`.
    SendFile {
        /// Destination address.
        address: u32,
        /// Padded payload size.
        size: u32,
    },
    /// Start executing at `address`.
    Go {
        /// Entry point.
        address: u32,
    },
}

impl MonitorCommand {
    /// Encode the command as sent on the wire.
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for MonitorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Ping => write!(f, "N#"),
            Self::WriteWord { address, value } => write!(f, "W{address:08X},{value:08X}#"),
            Self::ReadWord { address, count } => write!(f, "w{address:08X},{count:X}#"),
            Self::SendFile { address, size } => write!(f, "S{address:08X},{size:08X}#"),
            Self::Go { address } => write!(f, "G{address:08X}#"),
        }
    }
}
