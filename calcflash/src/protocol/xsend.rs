//! Block transfer used to install the receiving program.
//!
//! The boot monitor receives `S<addr>,<size>#`, answers `C`, then takes
//! XMODEM-style packets until EOT:
//!
//! ```text
//! Packet format:
//! +-----+-----+-----------+---------------+--------+
//! | SOH | SEQ | 0xFF-SEQ  |   DATA (128)  | CRC16  |
//! +-----+-----+-----------+---------------+--------+
//! | 1   | 1   | 1         |     128       | 2 (BE) |
//! +-----+-----+-----------+---------------+--------+
//! ```
//!
//! Unlike YMODEM there is no retry: the first missing or wrong ACK aborts the
//! transfer. The only resilience layer is the handshake's connect retry.

use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace};
use std::time::Duration;

use crate::error::{Error, Phase, Result};
use crate::port::Port;
use crate::protocol::command::MonitorCommand;
use crate::protocol::control::{ACK, EOT, SOH, TRANSFER_READY};
use crate::protocol::{expect_reply, xmodem_crc};

/// Payload bytes per packet.
pub const BLOCK_SIZE: usize = 128;

/// Header (3) + payload + CRC (2).
pub const PACKET_LEN: usize = 3 + BLOCK_SIZE + 2;

/// Largest payload the transfer accepts.
///
/// The padded size must stay below 32 KiB; larger programs are refused.
pub const MAX_PAYLOAD: usize = 32 * 1024 - BLOCK_SIZE;

/// Size of `len` bytes once padded to a whole number of packets.
pub fn padded_len(len: usize) -> usize {
    len.div_ceil(BLOCK_SIZE) * BLOCK_SIZE
}

/// Copy `data` and append zero bytes up to the next packet boundary.
pub fn pad(data: &[u8]) -> Vec<u8> {
    let mut padded = data.to_vec();
    padded.resize(padded_len(data.len()), 0x00);
    padded
}

/// Sequence byte for 1-based packet number `number` (wraps modulo 256).
#[allow(clippy::cast_possible_truncation)]
pub fn sequence_byte(number: usize) -> u8 {
    (number & 0xFF) as u8
}

/// Build one packet for 1-based packet number `number`.
///
/// `block` must be exactly [`BLOCK_SIZE`] bytes (callers slice a padded
/// buffer).
pub fn build_packet(number: usize, block: &[u8]) -> Vec<u8> {
    debug_assert_eq!(block.len(), BLOCK_SIZE);

    let seq = sequence_byte(number);
    let mut packet = vec![0u8; PACKET_LEN];
    packet[0] = SOH;
    packet[1] = seq;
    packet[2] = 0xFF - seq;
    packet[3..3 + BLOCK_SIZE].copy_from_slice(block);
    BigEndian::write_u16(&mut packet[3 + BLOCK_SIZE..], xmodem_crc(block));
    packet
}

/// Single-attempt block transfer over a borrowed port.
pub struct XsendTransfer<'a, P: Port> {
    port: &'a mut P,
    timeout: Duration,
}

impl<'a, P: Port> XsendTransfer<'a, P> {
    /// Create a transfer that waits up to `timeout` for each acknowledgement.
    pub fn new(port: &'a mut P, timeout: Duration) -> Self {
        Self { port, timeout }
    }

    /// Announce the upload and wait for the monitor to become ready.
    ///
    /// Returns the zero-padded payload.
    #[allow(clippy::cast_possible_truncation)]
    pub fn init(&mut self, data: &[u8], address: u32) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Err(Error::InvalidLoader("program is empty".into()));
        }
        if data.len() > MAX_PAYLOAD {
            return Err(Error::InvalidLoader(format!(
                "program is {} bytes, limit is {MAX_PAYLOAD}",
                data.len()
            )));
        }

        let padded = pad(data);
        // Safe cast: bounded by MAX_PAYLOAD
        let cmd = MonitorCommand::SendFile {
            address,
            size: padded.len() as u32,
        };
        debug!("Sending {cmd}");
        self.port.write_all_bytes(&cmd.encode())?;

        expect_reply(
            &mut *self.port,
            &[TRANSFER_READY],
            self.timeout,
            Phase::LoaderUpload,
            "Cannot send transfer program",
        )?;
        Ok(padded)
    }

    /// Send every packet of an already padded payload.
    pub fn send_packets(&mut self, padded: &[u8]) -> Result<()> {
        for (index, block) in padded.chunks_exact(BLOCK_SIZE).enumerate() {
            let number = index + 1;
            let packet = build_packet(number, block);
            trace!("Sending packet {number} (seq 0x{:02X})", packet[1]);

            self.port.write_all_bytes(&packet)?;
            expect_reply(
                &mut *self.port,
                &[ACK],
                self.timeout,
                Phase::LoaderPacket(number),
                "Cannot send transfer program",
            )?;
        }
        Ok(())
    }

    /// Close the transfer with EOT.
    pub fn end(&mut self) -> Result<()> {
        debug!("Sending EOT");
        self.port.write_all_bytes(&[EOT])?;
        expect_reply(
            &mut *self.port,
            &[ACK],
            self.timeout,
            Phase::LoaderEnd,
            "Cannot end transfer program transmission",
        )
    }

    /// Upload `data` to `address`: init, packets, EOT.
    pub fn send(&mut self, data: &[u8], address: u32) -> Result<()> {
        let padded = self.init(data, address)?;
        debug!(
            "Uploading {} bytes ({} packets) to 0x{address:08X}",
            data.len(),
            padded.len() / BLOCK_SIZE
        );
        self.send_packets(&padded)?;
        self.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::mock::MockPort;

    const TIMEOUT: Duration = Duration::from_millis(10);

    fn open_mock(replies: &[u8]) -> MockPort {
        let mut port = MockPort::new(replies);
        port.open().unwrap();
        port
    }

    #[test]
    fn test_padded_len_is_smallest_multiple() {
        assert_eq!(padded_len(0), 0);
        assert_eq!(padded_len(1), 128);
        assert_eq!(padded_len(127), 128);
        assert_eq!(padded_len(128), 128);
        assert_eq!(padded_len(129), 256);
        assert_eq!(padded_len(250), 256);
    }

    #[test]
    fn test_pad_appends_zeros_only() {
        for len in [1usize, 100, 128, 250, 300] {
            let data = vec![0xAB; len];
            let padded = pad(&data);
            assert_eq!(padded.len() % BLOCK_SIZE, 0);
            assert!(padded.len() >= len && padded.len() < len + BLOCK_SIZE);
            assert_eq!(&padded[..len], &data[..]);
            assert!(padded[len..].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_build_packet_layout() {
        let block: Vec<u8> = (0..128u8).collect();
        let packet = build_packet(1, &block);

        assert_eq!(packet.len(), PACKET_LEN);
        assert_eq!(packet[0], SOH);
        assert_eq!(packet[1], 0x01);
        assert_eq!(packet[2], 0xFE);
        assert_eq!(&packet[3..131], &block[..]);

        let crc = xmodem_crc(&block);
        assert_eq!(packet[131], (crc >> 8) as u8);
        assert_eq!(packet[132], (crc & 0xFF) as u8);
    }

    #[test]
    fn test_sequence_wraps() {
        for n in [1usize, 2, 127, 255, 256, 257, 511] {
            let packet = build_packet(n, &[0u8; BLOCK_SIZE]);
            assert_eq!(packet[1], (n % 256) as u8);
            assert_eq!(packet[2], 0xFF - packet[1]);
        }
        assert_eq!(sequence_byte(256), 0);
    }

    #[test]
    fn test_send_writes_command_packets_and_eot() {
        // C, ACK x2, ACK(EOT)
        let mut port = open_mock(&[b'C', ACK, ACK, ACK]);
        let data = vec![0x42; 200];

        XsendTransfer::new(&mut port, TIMEOUT)
            .send(&data, 0x0020_2000)
            .unwrap();

        let writes = port.writes();
        assert_eq!(writes.len(), 4);
        assert_eq!(writes[0], b"S00202000,00000100#".to_vec());
        assert_eq!(writes[1][1], 1);
        assert_eq!(writes[2][1], 2);
        assert_eq!(writes[2].len(), PACKET_LEN);
        // Second packet holds 72 data bytes then zero padding
        assert!(writes[2][3..3 + 72].iter().all(|&b| b == 0x42));
        assert!(writes[2][3 + 72..3 + BLOCK_SIZE].iter().all(|&b| b == 0));
        assert_eq!(writes[3], vec![EOT]);
    }

    #[test]
    fn test_init_rejects_wrong_answer() {
        let mut port = open_mock(&[0x15]);
        let err = XsendTransfer::new(&mut port, TIMEOUT)
            .init(&[1, 2, 3], 0x0020_2000)
            .unwrap_err();

        assert_eq!(err.to_string(), "Cannot send transfer program");
        assert_eq!(err.phase(), Some(Phase::LoaderUpload));
        assert_eq!(err.response(), Some(&[0x15][..]));
    }

    #[test]
    fn test_packet_nak_aborts_without_retry() {
        // C, ACK for packet 1, NAK for packet 2
        let mut port = open_mock(&[b'C', ACK, 0x15, ACK, ACK]);
        let data = vec![0x11; 3 * BLOCK_SIZE];

        let err = XsendTransfer::new(&mut port, TIMEOUT)
            .send(&data, 0x0020_2000)
            .unwrap_err();

        assert_eq!(err.phase(), Some(Phase::LoaderPacket(2)));
        // S command + 2 packets, no retry and no third packet
        assert_eq!(port.writes().len(), 3);
    }

    #[test]
    fn test_packet_timeout() {
        let mut port = open_mock(&[b'C']);
        let err = XsendTransfer::new(&mut port, TIMEOUT)
            .send(&[0xEE; 10], 0x0020_2000)
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Timeout {
                phase: Phase::LoaderPacket(1)
            }
        ));
    }

    #[test]
    fn test_end_requires_ack() {
        let mut port = open_mock(&[b'C', ACK, b'?']);
        let err = XsendTransfer::new(&mut port, TIMEOUT)
            .send(&[0xEE; 10], 0x0020_2000)
            .unwrap_err();

        assert_eq!(err.to_string(), "Cannot end transfer program transmission");
        assert_eq!(err.phase(), Some(Phase::LoaderEnd));
    }

    #[test]
    fn test_init_rejects_oversized_payload() {
        let mut port = open_mock(&[]);
        let err = XsendTransfer::new(&mut port, TIMEOUT)
            .init(&vec![0u8; MAX_PAYLOAD + 1], 0)
            .unwrap_err();

        assert!(err.is_validation());
        assert!(port.writes().is_empty());
    }
}
