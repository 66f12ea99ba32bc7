//! Firmware image loaded from disk.
//!
//! The file has no header or footer: every byte is payload.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::protocol::stream::{CHUNK_SIZE, chunk_count};

/// Immutable firmware bytes plus where they came from.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    path: Option<PathBuf>,
    data: Vec<u8>,
}

impl FirmwareImage {
    /// Load an image, failing with [`Error::InvalidFirmware`] when the file is
    /// missing, unreadable or empty.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                Error::InvalidFirmware(format!("{} does not exist", path.display()))
            },
            _ => Error::InvalidFirmware(format!("cannot read {}: {e}", path.display())),
        })?;
        debug!("Loaded {} ({} bytes)", path.display(), data.len());

        let mut image = Self::from_bytes(data)?;
        image.path = Some(path.to_path_buf());
        Ok(image)
    }

    /// Wrap bytes already in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidFirmware("image is empty".into()));
        }
        Ok(Self { path: None, data })
    }

    /// Source file, if the image was loaded from disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Raw bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a successfully constructed image.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whole kilobytes, as shown in progress reports.
    pub fn total_kilobytes(&self) -> usize {
        self.data.len() / 1024
    }

    /// Number of stream chunks.
    pub fn chunk_count(&self) -> usize {
        chunk_count(self.data.len())
    }

    /// Stream chunks in order; the last one may be short.
    pub fn chunks(&self) -> std::slice::Chunks<'_, u8> {
        self.data.chunks(CHUNK_SIZE)
    }
}
