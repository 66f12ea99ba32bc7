//! Run a session on its own thread and observe it through console events.

use std::io;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use log::debug;

use crate::console::{ChannelConsole, ConsoleEvent};
use crate::error::{Error, Result};
use crate::port::Port;
use crate::session::Session;

/// Default number of undelivered console events.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// A session running on a dedicated thread.
///
/// Iterate [`FlashWorker::events`] until it ends (the session finished and
/// dropped its console), then [`FlashWorker::join`] for the result.
pub struct FlashWorker {
    events: Receiver<ConsoleEvent>,
    handle: JoinHandle<Result<()>>,
}

impl FlashWorker {
    /// Move `session` onto a new thread and start it.
    ///
    /// At most `capacity` events are buffered; beyond that the worker waits
    /// for messages and drops progress updates.
    pub fn spawn<P: Port + 'static>(mut session: Session<P>, capacity: usize) -> Result<Self> {
        let (console, events) = ChannelConsole::bounded(capacity);
        let handle = thread::Builder::new()
            .name("calcflash-worker".into())
            .spawn(move || {
                let result = session.run(&console);
                debug!("Worker finished: {}", session.status());
                result
            })?;
        Ok(Self { events, handle })
    }

    /// Events emitted by the session, in order.
    pub fn events(&self) -> &Receiver<ConsoleEvent> {
        &self.events
    }

    /// Wait for the session to finish and return its result.
    ///
    /// Pending events are discarded, so the worker never waits on a consumer
    /// that stopped reading.
    pub fn join(self) -> Result<()> {
        let Self { events, handle } = self;
        drop(events);
        handle
            .join()
            .map_err(|_| Error::Io(io::Error::other("flash worker panicked")))?
    }
}
