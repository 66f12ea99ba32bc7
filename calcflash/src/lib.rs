//! # calcflash
//!
//! A library for flashing calculator firmware through a SAM-BA style serial
//! boot monitor.
//!
//! A flash session runs in three stages over one serial line:
//!
//! - wake the boot monitor and poke the target's clock and interrupt
//!   registers;
//! - upload a small receiving program with an XMODEM-style block transfer
//!   (128-byte packets, CRC-16/XMODEM) and start it;
//! - stream the firmware image to that program in 256-byte chunks, each
//!   followed by an XOR checksum and acknowledged with `Y`.
//!
//! ## Features
//!
//! - `native` (default): serial port backend via the `serialport` crate
//! - `serde`: serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use calcflash::{LoaderProgram, LogConsole, NativePort, Session, SessionConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let loader = LoaderProgram::from_file("receiver.bin")?;
//!     let config = SessionConfig::new("firmware.bin", loader);
//!     let port = NativePort::with_name("/dev/ttyACM0", 115_200);
//!
//!     let mut session = Session::new(port, config);
//!     session.run(&LogConsole)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod console;
pub mod device;
pub mod error;
pub mod image;
pub mod link;
pub mod port;
pub mod protocol;
pub mod session;
pub mod target;
pub mod worker;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker polled by running sessions.
///
/// The checker should return `true` when the current session should stop
/// (for example after receiving Ctrl-C in CLI applications). Only the first
/// registration takes effect.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    console::{ChannelConsole, Console, ConsoleEvent, LogConsole},
    device::{DetectedPort, DeviceKind, auto_detect_port, detect_ports, format_port_list},
    error::{Error, Phase, Result},
    image::{FirmwareImage, LoaderProgram},
    link::{LinkState, Timeouts},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    session::{Session, SessionConfig, SessionState, SessionStatus},
    target::TargetProfile,
    worker::FlashWorker,
};
