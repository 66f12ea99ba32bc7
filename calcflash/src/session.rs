//! Flash session: one complete run from handshake to the last firmware chunk.
//!
//! ```text
//! NotStarted -> Connecting -> SendingInit -> SendingLoader
//!            -> ExecutingLoader -> StreamingFirmware -> Done
//! ```
//!
//! Any state can end in `Failed`. The session owns its port for the whole run
//! and closes it on every exit path; the firmware file is checked before the
//! port is opened at all.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;

use log::{debug, info, warn};

use crate::console::Console;
use crate::error::{Error, Phase, Result};
use crate::image::{FirmwareImage, LoaderProgram};
use crate::link::{Link, Timeouts};
use crate::port::Port;
use crate::protocol::MonitorCommand;
use crate::protocol::control::TRANSFER_READY;
use crate::protocol::expect_reply;
use crate::protocol::stream::FirmwareStream;
use crate::protocol::xsend::XsendTransfer;
use crate::target::TargetProfile;

/// Everything a session needs besides the port.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Firmware image file.
    pub firmware: PathBuf,
    /// Receiving program uploaded before the firmware.
    pub loader: LoaderProgram,
    /// Report raw unexpected answers to the console.
    pub debug: bool,
    /// Read windows.
    pub timeouts: Timeouts,
    /// Register setup for the target.
    pub target: TargetProfile,
}

impl SessionConfig {
    /// Default timeouts and target profile, debug off.
    pub fn new(firmware: impl Into<PathBuf>, loader: LoaderProgram) -> Self {
        Self {
            firmware: firmware.into(),
            loader,
            debug: false,
            timeouts: Timeouts::default(),
            target: TargetProfile::default(),
        }
    }

    /// Enable or disable debug reporting.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Replace the read windows.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// Step the session is in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// `run` not called yet.
    NotStarted,
    /// Handshake with the boot monitor.
    Connecting,
    /// Register setup.
    SendingInit,
    /// Uploading the receiving program.
    SendingLoader,
    /// Starting the receiving program.
    ExecutingLoader,
    /// Streaming the firmware image.
    StreamingFirmware,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed(String),
}

/// Outcome of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SessionStatus {
    /// Not finished yet.
    Pending,
    /// The whole image was acknowledged.
    Success,
    /// The session stopped; the message is what was reported to the console.
    Failure(String),
}

impl SessionStatus {
    /// Whether the session completed.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failure(msg) => write!(f, "failure: {msg}"),
        }
    }
}

type CancelCheck = Box<dyn Fn() -> bool + Send + Sync>;

/// A single flash attempt against one port.
pub struct Session<P: Port> {
    port: P,
    config: SessionConfig,
    state: SessionState,
    status: SessionStatus,
    cancel: CancelCheck,
}

impl<P: Port> Session<P> {
    /// Create a session. The port may be closed; `run` opens it.
    ///
    /// Cancellation follows [`crate::is_interrupted_requested`].
    pub fn new(port: P, config: SessionConfig) -> Self {
        Self {
            port,
            config,
            state: SessionState::NotStarted,
            status: SessionStatus::Pending,
            cancel: Box::new(crate::is_interrupted_requested),
        }
    }

    /// Replace the cancellation check polled between firmware chunks.
    #[must_use]
    pub fn with_cancel_check<F>(mut self, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.cancel = Box::new(check);
        self
    }

    /// Current step.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Final outcome, or `Pending` before `run` returns.
    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Borrow the port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Give the port back.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Flash the configured firmware.
    ///
    /// Errors are reported to `console` exactly once before being returned,
    /// and the port is closed whatever the outcome.
    pub fn run(&mut self, console: &dyn Console) -> Result<()> {
        let image = match FirmwareImage::from_file(&self.config.firmware) {
            Ok(image) => image,
            Err(e) => return Err(self.finish_with_error(e, console)),
        };

        if let Err(e) = self.port.open() {
            return Err(self.finish_with_error(e, console));
        }

        let result = self.flash(&image, console);

        // The outcome is already decided; a failing close only gets logged
        if let Err(e) = self.port.close() {
            warn!("Failed to close {}: {e}", self.port.name());
        }

        match result {
            Ok(()) => {
                self.state = SessionState::Done;
                self.status = SessionStatus::Success;
                Ok(())
            },
            Err(e) => Err(self.finish_with_error(e, console)),
        }
    }

    fn flash(&mut self, image: &FirmwareImage, console: &dyn Console) -> Result<()> {
        let timeouts = self.config.timeouts;

        self.state = SessionState::Connecting;
        console.report(&format!("Connecting to {}", self.port.name()));
        let mut link = Link::new(&mut self.port, timeouts);
        link.connect()?;

        self.state = SessionState::SendingInit;
        link.send_initial_instructions(&self.config.target)?;

        self.send_receiving_program(console)?;
        self.send_firmware(image, console)
    }

    fn send_receiving_program(&mut self, console: &dyn Console) -> Result<()> {
        self.state = SessionState::SendingLoader;
        if (self.cancel)() {
            return Err(Error::Cancelled);
        }

        let loader = &self.config.loader;
        let response = self.config.timeouts.response;
        console.report("Sending transfer program");

        let disable = self.config.target.interrupt_disable;
        debug!("Sending {disable}");
        self.port.write_all_bytes(&disable.encode())?;

        XsendTransfer::new(&mut self.port, response).send(loader.code(), loader.address())?;

        self.state = SessionState::ExecutingLoader;
        let go = MonitorCommand::Go {
            address: loader.address(),
        };
        debug!("Sending {go}");
        self.port.write_all_bytes(&go.encode())?;
        expect_reply(
            &mut self.port,
            &[TRANSFER_READY],
            response,
            Phase::Execute,
            "Cannot execute transfer program",
        )
    }

    fn send_firmware(&mut self, image: &FirmwareImage, console: &dyn Console) -> Result<()> {
        self.state = SessionState::StreamingFirmware;
        console.report("Sending firmware");
        console.prepare_progress_report(image.total_kilobytes());

        FirmwareStream::new(&mut self.port, self.config.timeouts.response, &*self.cancel)
            .send(image.data(), |kb| console.report_progress(kb))?;

        self.port.flush()?;
        info!("Flashed {} bytes", image.len());
        console.report("Firmware flashed successfully");
        Ok(())
    }

    fn finish_with_error(&mut self, err: Error, console: &dyn Console) -> Error {
        let message = err.to_string();
        debug!("Session failed in {:?}: {message}", self.state);

        console.report_error(&message);
        if self.config.debug {
            if let Some(bytes) = err.response() {
                console.report_bytes("Received", bytes, true);
            }
        }

        self.state = SessionState::Failed(message.clone());
        self.status = SessionStatus::Failure(message);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::ConsoleEvent;
    use crate::port::mock::{MockPort, session_replies};
    use crate::protocol::control::{CHUNK_ACK, WAKE};
    use crate::protocol::stream::CHUNK_SIZE;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const LOADER_LEN: usize = 250;

    #[derive(Default)]
    struct RecordingConsole {
        events: Mutex<Vec<ConsoleEvent>>,
    }

    impl RecordingConsole {
        fn events(&self) -> Vec<ConsoleEvent> {
            self.events.lock().unwrap().clone()
        }

        fn errors(&self) -> Vec<String> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    ConsoleEvent::Error(msg) => Some(msg),
                    _ => None,
                })
                .collect()
        }

        fn push(&self, event: ConsoleEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl Console for RecordingConsole {
        fn report(&self, text: &str) {
            self.push(ConsoleEvent::Message(text.into()));
        }

        fn report_error(&self, text: &str) {
            self.push(ConsoleEvent::Error(text.into()));
        }

        fn prepare_progress_report(&self, total_kilobytes: usize) {
            self.push(ConsoleEvent::PrepareProgress { total_kilobytes });
        }

        fn report_progress(&self, kilobytes: usize) {
            self.push(ConsoleEvent::Progress { kilobytes });
        }
    }

    fn firmware_file(len: usize) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..len).map(|i| (i % 253) as u8).collect();
        file.write_all(&data).unwrap();
        file.flush().unwrap();
        file
    }

    fn config(firmware: &NamedTempFile) -> SessionConfig {
        let loader = LoaderProgram::new(vec![0xE5; LOADER_LEN], 0x0020_2000).unwrap();
        SessionConfig::new(firmware.path(), loader).with_timeouts(Timeouts {
            response: Duration::from_millis(5),
            handshake: Duration::from_millis(5),
            settle: Duration::ZERO,
        })
    }

    fn session(port: MockPort, config: SessionConfig) -> Session<MockPort> {
        let _ = env_logger::builder().is_test(true).try_init();
        Session::new(port, config).with_cancel_check(|| false)
    }

    fn chunk_writes(port: &MockPort) -> usize {
        port.writes().iter().filter(|w| w.len() == CHUNK_SIZE).count()
    }

    #[test]
    fn test_full_session_succeeds() {
        let firmware = firmware_file(10 * 1024);
        let port = MockPort::answering_session(LOADER_LEN, 10 * 1024);
        let console = RecordingConsole::default();

        let mut session = session(port, config(&firmware));
        session.run(&console).unwrap();

        assert_eq!(session.status(), &SessionStatus::Success);
        assert_eq!(session.state(), &SessionState::Done);
        assert_eq!(chunk_writes(session.port()), 40);
        assert!(!session.port().is_open());
        assert!(console.errors().is_empty());

        let events = console.events();
        assert!(events.contains(&ConsoleEvent::PrepareProgress {
            total_kilobytes: 10
        }));
        let progress = events
            .iter()
            .filter(|e| matches!(e, ConsoleEvent::Progress { .. }))
            .count();
        assert_eq!(progress, 40);
    }

    #[test]
    fn test_close_failure_after_success_is_not_an_error() {
        let firmware = firmware_file(1024);
        let mut port = MockPort::answering_session(LOADER_LEN, 1024);
        // Close 1 belongs to the handshake, close 2 ends the session
        port.fail_close_call(2);
        let console = RecordingConsole::default();

        let mut session = session(port, config(&firmware));
        session.run(&console).unwrap();

        assert_eq!(session.status(), &SessionStatus::Success);
        assert!(!session.port().is_open());
        assert!(console.errors().is_empty());
        assert!(
            console
                .events()
                .contains(&ConsoleEvent::Message("Firmware flashed successfully".into()))
        );
    }

    #[test]
    fn test_wire_order_before_stream() {
        let firmware = firmware_file(300);
        let port = MockPort::answering_session(LOADER_LEN, 300);
        let console = RecordingConsole::default();

        let mut session = session(port, config(&firmware));
        session.run(&console).unwrap();

        let writes = session.port().writes();
        // wake, ping, six register commands, timer off, S, 2 packets, EOT, G
        assert_eq!(writes[0], WAKE.to_vec());
        assert_eq!(writes[1], b"N#".to_vec());
        assert_eq!(writes[7], b"wFFFFFF60,4#".to_vec());
        assert_eq!(writes[8], b"WFFFFFD30,00000000#".to_vec());
        assert_eq!(writes[9], b"S00202000,00000100#".to_vec());
        assert_eq!(writes[12], vec![0x04]);
        assert_eq!(writes[13], b"G00202000#".to_vec());
        assert_eq!(writes[14].len(), 256);
        assert_eq!(writes[16].len(), 300 - 256);
    }

    #[test]
    fn test_no_handshake_fails_after_three_attempts() {
        let firmware = firmware_file(1024);
        let console = RecordingConsole::default();

        let mut session = session(MockPort::new(&[]), config(&firmware));
        let err = session.run(&console).unwrap_err();

        assert_eq!(err.to_string(), "Cannot connect");
        assert_eq!(session.port().count_writes(&WAKE), 3);
        assert!(!session.port().is_open());
        assert_eq!(console.errors(), vec!["Cannot connect".to_string()]);
        assert_eq!(
            session.status(),
            &SessionStatus::Failure("Cannot connect".into())
        );
    }

    #[test]
    fn test_bad_chunk_ack_stops_stream() {
        let firmware = firmware_file(16 * CHUNK_SIZE);
        let mut port = MockPort::new(&session_replies(LOADER_LEN));
        port.push_replies(&[CHUNK_ACK; 7]);
        port.push_replies(&[b'N']);
        port.push_replies(&[CHUNK_ACK; 8]);
        let console = RecordingConsole::default();

        let mut session = session(port, config(&firmware).with_debug(true));
        let err = session.run(&console).unwrap_err();

        assert_eq!(err.phase(), Some(Phase::FirmwareChunk(7)));
        assert!(err.to_string().contains("packet 7"));
        // Chunks 0..=7 written, nothing after
        assert_eq!(chunk_writes(session.port()), 8);
        assert!(!session.port().is_open());
        assert_eq!(
            console.errors(),
            vec![
                "Cannot send firmware packet 7".to_string(),
                "Received: 0x4e".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_firmware_never_opens_port() {
        let console = RecordingConsole::default();
        let loader = LoaderProgram::new(vec![0; 16], 0x0020_2000).unwrap();
        let config = SessionConfig::new("/nonexistent/firmware.bin", loader);

        let mut session = session(MockPort::new(&[]), config);
        for _ in 0..2 {
            let err = session.run(&console).unwrap_err();
            assert!(err.is_validation());
        }

        assert_eq!(session.port().open_calls(), 0);
        assert_eq!(session.port().close_calls(), 0);
        assert_eq!(console.errors().len(), 2);
    }

    #[test]
    fn test_cancel_between_chunks() {
        let firmware = firmware_file(8 * CHUNK_SIZE);
        let port = MockPort::answering_session(LOADER_LEN, 8 * CHUNK_SIZE);
        let console = RecordingConsole::default();

        // First poll happens before the upload, then one per chunk
        let polls = AtomicUsize::new(0);
        let mut session = Session::new(port, config(&firmware))
            .with_cancel_check(move || polls.fetch_add(1, Ordering::SeqCst) == 3);
        let err = session.run(&console).unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(chunk_writes(session.port()), 3);
        assert!(!session.port().is_open());
    }

    #[test]
    fn test_execute_requires_ready_answer() {
        let firmware = firmware_file(512);
        let mut replies = session_replies(LOADER_LEN);
        // Replace the answer to G
        replies.pop();
        replies.push(0x15);
        let console = RecordingConsole::default();

        let mut session = session(MockPort::new(&replies), config(&firmware));
        let err = session.run(&console).unwrap_err();

        assert_eq!(err.phase(), Some(Phase::Execute));
        assert_eq!(chunk_writes(session.port()), 0);
        assert!(matches!(session.state(), SessionState::Failed(_)));
    }
}
