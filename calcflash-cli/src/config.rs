//! Configuration file support for calcflash.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (CALCFLASH_*)
//! 3. Local config file (./calcflash.toml)
//! 4. Global config file (~/.config/calcflash/config.toml)
//!
//! `--config PATH` replaces 3 and 4.

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Local config file name.
pub const LOCAL_CONFIG: &str = "calcflash.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// Flash configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Receiving program binary.
    pub loader: Option<PathBuf>,
    /// Address the receiving program is uploaded to and started at.
    pub load_address: Option<u32>,
    /// Report raw unexpected answers.
    #[serde(default)]
    pub debug: bool,
    /// Acknowledgement read window in milliseconds.
    pub response_timeout_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Flash configuration.
    #[serde(default)]
    pub flash: FlashConfig,
}

impl Config {
    /// Load configuration from the global and local files.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "calcflash").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; set values in `other` win.
    fn merge(&mut self, other: Self) {
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }

        if other.flash.loader.is_some() {
            self.flash.loader = other.flash.loader;
        }
        if other.flash.load_address.is_some() {
            self.flash.load_address = other.flash.load_address;
        }
        if other.flash.debug {
            self.flash.debug = true;
        }
        if other.flash.response_timeout_ms.is_some() {
            self.flash.response_timeout_ms = other.flash.response_timeout_ms;
        }
    }
}
