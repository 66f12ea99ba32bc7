//! Checksums used on the wire.
//!
//! - CRC-16/XMODEM (poly 0x1021, init 0, no reflection) protects each
//!   receiving-program packet; the boot monitor verifies it.
//! - A plain XOR of all bytes protects each firmware chunk; the receiving
//!   program verifies it.

/// CRC-16/XMODEM polynomial.
const POLY: u16 = 0x1021;

/// Compute the CRC-16/XMODEM of `data`.
pub fn xmodem_crc(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |mut crc, &byte| {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
        crc
    })
}

/// XOR of every byte in `data`.
pub fn xor_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, &b| acc ^ b)
}
