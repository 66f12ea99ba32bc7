//! Handshake and hardware setup with the boot monitor.
//!
//! ```text
//! Idle -> Connecting -> Connected -> ConfiguringHardware -> Ready
//!              \              \                \
//!               +--------------+----------------+--> Failed
//! ```
//!
//! Each connect attempt writes the wake sequence, closes and reopens the line
//! (the monitor only notices the wake bytes on a fresh line state), pings and
//! waits for `LF CR`.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{Error, Phase, Result};
use crate::port::Port;
use crate::protocol::MonitorCommand;
use crate::protocol::control::{HANDSHAKE_ACK, WAKE};
use crate::target::TargetProfile;

/// Connect attempts before giving up.
pub const CONNECT_ATTEMPTS: usize = 3;

/// Read windows used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timeouts {
    /// Wait for an acknowledgement byte.
    pub response: Duration,
    /// Wait for the handshake answer.
    pub handshake: Duration,
    /// Pause between the ping and the handshake read.
    pub settle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            response: Duration::from_millis(1000),
            handshake: Duration::from_millis(200),
            settle: Duration::from_millis(10),
        }
    }
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Nothing sent yet.
    Idle,
    /// Wake/ping attempts in progress.
    Connecting,
    /// The monitor answered the ping.
    Connected,
    /// Register setup in progress.
    ConfiguringHardware,
    /// Register setup acknowledged; ready for the upload.
    Ready,
    /// A step failed; the link must not be used further.
    Failed,
}

/// Handshake layer over a borrowed port.
pub struct Link<'a, P: Port> {
    port: &'a mut P,
    timeouts: Timeouts,
    state: LinkState,
}

impl<'a, P: Port> Link<'a, P> {
    /// Wrap an open port.
    pub fn new(port: &'a mut P, timeouts: Timeouts) -> Self {
        Self {
            port,
            timeouts,
            state: LinkState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Wake the monitor and wait for its answer, retrying up to
    /// [`CONNECT_ATTEMPTS`] times.
    pub fn connect(&mut self) -> Result<()> {
        self.state = LinkState::Connecting;

        let mut last_reply = Vec::new();
        for attempt in 1..=CONNECT_ATTEMPTS {
            let reply = match self.try_connect() {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("Connect attempt {attempt}/{CONNECT_ATTEMPTS} failed: {e}");
                    if let Err(e) = self.port.close() {
                        debug!("Close after failed attempt: {e}");
                    }
                    continue;
                },
            };
            if reply == HANDSHAKE_ACK {
                info!("Connected to boot monitor on {}", self.port.name());
                self.state = LinkState::Connected;
                return Ok(());
            }
            warn!(
                "Connect attempt {attempt}/{CONNECT_ATTEMPTS} failed, got {reply:02X?}"
            );
            last_reply = reply;
        }

        Err(self.fail(Error::protocol(
            Phase::Connect,
            "Cannot connect",
            &last_reply,
        )))
    }

    /// One wake, reopen, ping, read round.
    fn try_connect(&mut self) -> Result<Vec<u8>> {
        // A previous attempt may have left the line closed
        self.port.open()?;
        self.port.write_all_bytes(&WAKE)?;
        self.port.close()?;
        self.port.open()?;
        self.port.write_all_bytes(&MonitorCommand::Ping.encode())?;
        thread::sleep(self.timeouts.settle);
        self.port.read_bytes(HANDSHAKE_ACK.len(), self.timeouts.handshake)
    }

    /// Send the register setup and check the length of the read-back.
    pub fn send_initial_instructions(&mut self, profile: &TargetProfile) -> Result<()> {
        self.state = LinkState::ConfiguringHardware;

        for cmd in &profile.initial_instructions {
            debug!("Sending {cmd}");
            if let Err(e) = self.port.write_all_bytes(&cmd.encode()) {
                return Err(self.fail(e));
            }
        }

        let reply = match self
            .port
            .read_bytes(profile.init_reply_len, self.timeouts.response)
        {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail(e)),
        };
        if reply.is_empty() {
            return Err(self.fail(Error::Timeout {
                phase: Phase::InitialInstructions,
            }));
        }
        if reply.len() != profile.init_reply_len {
            return Err(self.fail(Error::protocol(
                Phase::InitialInstructions,
                "Cannot send initial instructions",
                &reply,
            )));
        }

        debug!("Initial instructions read back {reply:02X?}");
        self.state = LinkState::Ready;
        Ok(())
    }

    fn fail(&mut self, err: Error) -> Error {
        self.state = LinkState::Failed;
        err
    }
}
