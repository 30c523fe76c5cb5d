use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::protocol::{Callback, RequestLine, is_authenticated};

/// Receives parsed callbacks.
pub trait CallbackHandler: Send + Sync {
    /// Handles `callback`; returns whether the rest of its batch is skipped.
    ///
    /// [`Callback::is_terminal`] is the answer for every shape whose outcome
    /// does not depend on handler state.
    fn handle(&self, callback: Callback) -> bool;
}

impl<F> CallbackHandler for F
where
    F: Fn(Callback) -> bool + Send + Sync,
{
    fn handle(&self, callback: Callback) -> bool {
        self(callback)
    }
}

/// Turns raw callback lines into [`Callback`]s for a handler.
///
/// Request lines carry a sequence number; a number not greater than the last
/// accepted one marks the rest of its batch as stale.
pub struct Dispatcher<H> {
    handler: H,
    last_sequence: Mutex<Option<u64>>,
}

impl<H: CallbackHandler> Dispatcher<H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            last_sequence: Mutex::new(None),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn last_sequence(&self) -> Option<u64> {
        *self.last_sequence.lock()
    }

    /// Checks the `Host` header against `listener_port`, then processes the lines.
    ///
    /// Returns `false` if the request was discarded as unauthenticated.
    pub fn process_request(&self, lines: &[String], listener_port: u16) -> bool {
        if !is_authenticated(lines, listener_port) {
            warn!(listener_port, lines = lines.len(), "discarding callback request with foreign host");
            return false;
        }
        self.process_lines(lines);
        true
    }

    /// Processes one request worth of lines.
    ///
    /// Lines following an accepted request line (POST bodies) are tried as
    /// callbacks as well. Processing stops at the first terminal callback.
    pub fn process_lines(&self, lines: &[String]) {
        let mut accepted = false;
        for line in lines {
            trace!(%line, "processing callback line");
            if let Some(request) = RequestLine::parse(line) {
                {
                    let mut last = self.last_sequence.lock();
                    if let Some(previous) = *last
                        && request.sequence <= previous
                    {
                        debug!(sequence = request.sequence, previous, "ignoring stale callback");
                        break;
                    }
                    *last = Some(request.sequence);
                }
                accepted = true;
                if self.process_callback(request.callback) {
                    debug!(method = request.method, sequence = request.sequence, callback = request.callback, "processed callback");
                    break;
                }
                continue;
            }

            if accepted && self.process_callback(line) {
                debug!(%line, "processed callback from request body");
                break;
            }
        }
    }

    /// Parses and dispatches a single callback. Returns whether it was terminal.
    pub fn process_callback(&self, line: &str) -> bool {
        match Callback::parse(line) {
            Some(callback) => {
                trace!(kind = callback.kind(), "dispatching callback");
                self.handler.handle(callback)
            }
            None => {
                trace!(%line, "no callback matched");
                false
            }
        }
    }
}

impl<H> std::fmt::Debug for Dispatcher<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("last_sequence", &*self.last_sequence.lock())
            .finish()
    }
}
