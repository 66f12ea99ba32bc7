//! The receiving program uploaded to target RAM before the firmware stream.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::protocol::xsend::{MAX_PAYLOAD, padded_len};
use crate::target::DEFAULT_LOAD_ADDRESS;

/// Machine code of the receiving program and the address it runs at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderProgram {
    code: Vec<u8>,
    address: u32,
}

impl LoaderProgram {
    /// Validate `code` for upload to `address`.
    pub fn new(code: Vec<u8>, address: u32) -> Result<Self> {
        if code.is_empty() {
            return Err(Error::InvalidLoader("program is empty".into()));
        }
        if code.len() > MAX_PAYLOAD {
            return Err(Error::InvalidLoader(format!(
                "program is {} bytes, limit is {MAX_PAYLOAD}",
                code.len()
            )));
        }
        Ok(Self { code, address })
    }

    /// Load the program from a raw binary file, to run at the default address.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let code = fs::read(path)
            .map_err(|e| Error::InvalidLoader(format!("cannot read {}: {e}", path.display())))?;
        Self::new(code, DEFAULT_LOAD_ADDRESS)
    }

    /// Override the load and entry address.
    #[must_use]
    pub fn at(mut self, address: u32) -> Self {
        self.address = address;
        self
    }

    /// Machine code, unpadded.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Load and entry address.
    pub fn address(&self) -> u32 {
        self.address
    }

    /// Size on the wire after padding to whole packets.
    pub fn padded_len(&self) -> usize {
        padded_len(self.code.len())
    }
}
