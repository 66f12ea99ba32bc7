//! Wire protocol implementations.
//!
//! Two framings share the serial line:
//!
//! - the boot monitor's ASCII command set plus an XMODEM-style block transfer
//!   ([`command`], [`xsend`]) used to install the receiving program;
//! - the receiving program's own chunked stream with XOR checksums
//!   ([`stream`]) used to push the firmware image.

pub mod checksum;
pub mod command;
pub mod stream;
pub mod xsend;

pub use checksum::{xmodem_crc, xor_checksum};
pub use command::MonitorCommand;

/// Control bytes exchanged with the target.
pub mod control {
    /// Start of a 128-byte transfer packet.
    pub const SOH: u8 = 0x01;
    /// End of transmission.
    pub const EOT: u8 = 0x04;
    /// Packet acknowledge.
    pub const ACK: u8 = 0x06;
    /// The monitor is ready to receive (after `S`) or the program started (after `G`).
    pub const TRANSFER_READY: u8 = b'C';
    /// Firmware chunk acknowledge from the receiving program.
    pub const CHUNK_ACK: u8 = b'Y';
    /// Wake-up sequence sent before reopening the line.
    pub const WAKE: [u8; 3] = [0x80, 0x80, b'#'];
    /// Answer to the ping once the monitor is in binary mode (LF CR).
    pub const HANDSHAKE_ACK: [u8; 2] = [0x0A, 0x0D];
}

use std::time::Duration;

use crate::error::{Error, Phase, Result};
use crate::port::Port;

/// Read `expected.len()` bytes and compare them with `expected`.
///
/// An empty read is a [`Error::Timeout`]; anything else that does not match
/// is an [`Error::Protocol`] carrying the received bytes.
pub(crate) fn expect_reply<P: Port + ?Sized>(
    port: &mut P,
    expected: &[u8],
    timeout: Duration,
    phase: Phase,
    message: &str,
) -> Result<()> {
    let reply = port.read_bytes(expected.len(), timeout)?;
    if reply.is_empty() {
        return Err(Error::Timeout { phase });
    }
    if reply != expected {
        log::debug!("{phase}: expected {expected:02X?}, got {reply:02X?}");
        return Err(Error::protocol(phase, message, &reply));
    }
    Ok(())
}
