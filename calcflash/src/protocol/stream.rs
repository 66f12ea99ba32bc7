//! Firmware stream spoken by the receiving program.
//!
//! ```text
//! Chunk format:
//! +------------------+-----+        reply
//! | DATA (<= 256)    | XOR |  --->  'Y'
//! +------------------+-----+
//! ```
//!
//! The final chunk is sent as-is, without zero padding. The receiving program
//! is told nothing about the image size, so every chunk is acknowledged on its
//! own and the first bad acknowledgement ends the session: a partly written
//! flash cannot be resumed safely.

use log::{debug, trace};
use std::time::Duration;

use crate::error::{Error, Phase, Result};
use crate::port::Port;
use crate::protocol::control::CHUNK_ACK;
use crate::protocol::{expect_reply, xor_checksum};

/// Firmware bytes per chunk.
pub const CHUNK_SIZE: usize = 256;

/// Number of chunks needed for `len` bytes.
pub fn chunk_count(len: usize) -> usize {
    len.div_ceil(CHUNK_SIZE)
}

/// Kilobytes reported after chunk `index` has been acknowledged.
///
/// This counts the chunks *before* `index`, so the last report of an image is
/// one chunk short of the total.
pub fn progress_kilobytes(index: usize) -> usize {
    index * CHUNK_SIZE / 1024
}

/// Chunked firmware transfer over a borrowed port.
pub struct FirmwareStream<'a, P: Port> {
    port: &'a mut P,
    timeout: Duration,
    cancel: &'a dyn Fn() -> bool,
}

impl<'a, P: Port> FirmwareStream<'a, P> {
    /// Create a stream that waits up to `timeout` for each acknowledgement.
    ///
    /// `cancel` is polled after every acknowledged chunk.
    pub fn new(port: &'a mut P, timeout: Duration, cancel: &'a dyn Fn() -> bool) -> Self {
        Self {
            port,
            timeout,
            cancel,
        }
    }

    /// Send `image` chunk by chunk, calling `progress` with the kilobytes
    /// transferred so far after each acknowledgement.
    pub fn send<F>(&mut self, image: &[u8], mut progress: F) -> Result<()>
    where
        F: FnMut(usize),
    {
        debug!(
            "Streaming {} bytes in {} chunks",
            image.len(),
            chunk_count(image.len())
        );

        for (index, chunk) in image.chunks(CHUNK_SIZE).enumerate() {
            let checksum = xor_checksum(chunk);
            trace!(
                "Chunk {index}: {} bytes, checksum 0x{checksum:02X}",
                chunk.len()
            );

            self.port.write_all_bytes(chunk)?;
            self.port.write_all_bytes(&[checksum])?;
            expect_reply(
                &mut *self.port,
                &[CHUNK_ACK],
                self.timeout,
                Phase::FirmwareChunk(index),
                &format!("Cannot send firmware packet {index}"),
            )?;

            progress(progress_kilobytes(index));

            if (self.cancel)() {
                debug!("Interrupted after chunk {index}");
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }
}
