//! Scripted port used by the protocol tests.
//!
//! Reads are served from a queue of reply bytes; an empty queue behaves like a
//! read timeout. Every `write` call is recorded separately.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::port::Port;

pub(crate) struct MockPort {
    replies: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    open: bool,
    open_calls: usize,
    close_calls: usize,
    failing_open: Option<usize>,
    failing_close: Option<usize>,
    timeout: Duration,
}

impl MockPort {
    pub(crate) fn new(replies: &[u8]) -> Self {
        Self {
            replies: replies.iter().copied().collect(),
            writes: Vec::new(),
            open: false,
            open_calls: 0,
            close_calls: 0,
            failing_open: None,
            failing_close: None,
            timeout: Duration::from_millis(1000),
        }
    }

    /// Mock that answers a whole successful session for a `loader_len`-byte
    /// receiving program and a `firmware_len`-byte image.
    pub(crate) fn answering_session(loader_len: usize, firmware_len: usize) -> Self {
        let mut replies = session_replies(loader_len);
        let chunks = firmware_len.div_ceil(crate::protocol::stream::CHUNK_SIZE);
        replies.extend(std::iter::repeat_n(crate::protocol::control::CHUNK_ACK, chunks));
        Self::new(&replies)
    }

    /// Make the `n`th call to `open()` (1-based) fail without opening.
    pub(crate) fn fail_open_call(&mut self, n: usize) {
        self.failing_open = Some(n);
    }

    /// Make the `n`th call to `close()` (1-based) fail after releasing the
    /// line.
    pub(crate) fn fail_close_call(&mut self, n: usize) {
        self.failing_close = Some(n);
    }

    pub(crate) fn push_replies(&mut self, bytes: &[u8]) {
        self.replies.extend(bytes);
    }

    pub(crate) fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    pub(crate) fn open_calls(&self) -> usize {
        self.open_calls
    }

    pub(crate) fn close_calls(&self) -> usize {
        self.close_calls
    }

    /// Number of recorded writes equal to `bytes`.
    pub(crate) fn count_writes(&self, bytes: &[u8]) -> usize {
        self.writes.iter().filter(|w| w.as_slice() == bytes).count()
    }
}

/// Replies for everything before the firmware stream: handshake, initial
/// instructions, upload announcement, one ACK per loader packet, EOT, execute.
pub(crate) fn session_replies(loader_len: usize) -> Vec<u8> {
    use crate::protocol::control::{ACK, HANDSHAKE_ACK, TRANSFER_READY};
    use crate::protocol::xsend::BLOCK_SIZE;

    let packets = loader_len.div_ceil(BLOCK_SIZE);
    let mut replies = HANDSHAKE_ACK.to_vec();
    replies.extend_from_slice(&[0x00, 0x01, 0x34, 0x00]);
    replies.push(TRANSFER_READY);
    replies.extend(std::iter::repeat_n(ACK, packets));
    replies.push(ACK);
    replies.push(TRANSFER_READY);
    replies
}

impl Port for MockPort {
    fn open(&mut self) -> Result<()> {
        if !self.open {
            self.open_calls += 1;
            if self.failing_open == Some(self.open_calls) {
                return Err(io::Error::new(io::ErrorKind::NotFound, "device busy").into());
            }
            self.open = true;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.close_calls += 1;
            if self.failing_close == Some(self.close_calls) {
                return Err(io::Error::other("close failed").into());
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn name(&self) -> &str {
        "mock"
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        if self.replies.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.replies.len());
        for (slot, byte) in buf.iter_mut().zip(self.replies.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        self.writes.push(buf.to_vec());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
