//! Console collaborator: where a session sends its messages and progress.
//!
//! The session never renders anything itself. It calls a [`Console`], which
//! may log ([`LogConsole`]) or forward events to another thread over a
//! bounded channel ([`ChannelConsole`]) so a UI can render them without the
//! flashing worker waiting on it for more than one slot.

use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};

use log::{error, info, trace};

/// Receiver of session messages and progress.
pub trait Console: Send + Sync {
    /// Informational message.
    fn report(&self, text: &str);

    /// Error message.
    fn report_error(&self, text: &str);

    /// Raw bytes rendered as `0x..` tokens after `label`.
    fn report_bytes(&self, label: &str, bytes: &[u8], is_error: bool) {
        let text = format!("{label}: {}", format_bytes(bytes));
        if is_error {
            self.report_error(&text);
        } else {
            self.report(&text);
        }
    }

    /// Called once before the firmware stream with the image size in KiB.
    fn prepare_progress_report(&self, total_kilobytes: usize);

    /// Called after each acknowledged firmware chunk.
    fn report_progress(&self, kilobytes: usize);
}

/// Render bytes as space separated `0x%x` tokens.
pub fn format_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:#x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// One console notification, as carried by [`ChannelConsole`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ConsoleEvent {
    /// Informational message.
    Message(String),
    /// Error message.
    Error(String),
    /// Firmware stream about to start.
    PrepareProgress {
        /// Image size in KiB.
        total_kilobytes: usize,
    },
    /// Firmware stream progress.
    Progress {
        /// KiB acknowledged so far.
        kilobytes: usize,
    },
}

/// Console that forwards events over a bounded channel.
///
/// Progress events are dropped when the channel is full, since a later one
/// supersedes them; messages always wait for a free slot. Events sent after
/// the receiver is gone are discarded.
#[derive(Debug, Clone)]
pub struct ChannelConsole {
    tx: SyncSender<ConsoleEvent>,
}

impl ChannelConsole {
    /// Create a console and the receiving end, holding at most `capacity`
    /// undelivered events.
    pub fn bounded(capacity: usize) -> (Self, Receiver<ConsoleEvent>) {
        let (tx, rx) = sync_channel(capacity.max(1));
        (Self { tx }, rx)
    }

    fn send(&self, event: ConsoleEvent) {
        let _ = self.tx.send(event);
    }
}

impl Console for ChannelConsole {
    fn report(&self, text: &str) {
        self.send(ConsoleEvent::Message(text.to_string()));
    }

    fn report_error(&self, text: &str) {
        self.send(ConsoleEvent::Error(text.to_string()));
    }

    fn prepare_progress_report(&self, total_kilobytes: usize) {
        self.send(ConsoleEvent::PrepareProgress { total_kilobytes });
    }

    fn report_progress(&self, kilobytes: usize) {
        match self.tx.try_send(ConsoleEvent::Progress { kilobytes }) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {},
            Err(TrySendError::Full(_)) => trace!("Console busy, dropped progress {kilobytes} KiB"),
        }
    }
}

/// Console that writes everything to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConsole;

impl Console for LogConsole {
    fn report(&self, text: &str) {
        info!("{text}");
    }

    fn report_error(&self, text: &str) {
        error!("{text}");
    }

    fn prepare_progress_report(&self, total_kilobytes: usize) {
        info!("Flashing {total_kilobytes} KiB");
    }

    fn report_progress(&self, kilobytes: usize) {
        trace!("{kilobytes} KiB written");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(&[0x0A, 0x0D]), "0xa 0xd");
        assert_eq!(format_bytes(&[0x00, 0xFF]), "0x0 0xff");
        assert_eq!(format_bytes(&[]), "");
    }

    #[test]
    fn test_channel_console_forwards_in_order() {
        let (console, rx) = ChannelConsole::bounded(8);
        console.report("hello");
        console.prepare_progress_report(10);
        console.report_progress(1);
        console.report_bytes("Unexpected answer", &[0x4E], true);
        drop(console);

        let events: Vec<ConsoleEvent> = rx.iter().collect();
        assert_eq!(
            events,
            vec![
                ConsoleEvent::Message("hello".into()),
                ConsoleEvent::PrepareProgress { total_kilobytes: 10 },
                ConsoleEvent::Progress { kilobytes: 1 },
                ConsoleEvent::Error("Unexpected answer: 0x4e".into()),
            ]
        );
    }

    #[test]
    fn test_progress_dropped_when_full() {
        let (console, rx) = ChannelConsole::bounded(1);
        console.report_progress(1);
        console.report_progress(2);
        drop(console);

        let events: Vec<ConsoleEvent> = rx.iter().collect();
        assert_eq!(events, vec![ConsoleEvent::Progress { kilobytes: 1 }]);
    }

    #[test]
    fn test_send_after_receiver_dropped_is_ignored() {
        let (console, rx) = ChannelConsole::bounded(1);
        drop(rx);
        console.report("nobody listening");
        console.report_progress(3);
    }
}
