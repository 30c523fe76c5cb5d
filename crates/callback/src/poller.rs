use std::time::Duration;

use runtime::{CancellationToken, JoinOutcome, TaskHandle};
use tracing::{info, trace};

use crate::protocol::split_polled_callbacks;

/// Fallback transport: periodically drains the surface's callback buffer.
pub struct CallbackPoller {
    token: CancellationToken,
    task: Option<TaskHandle>,
    join_grace: Duration,
}

impl CallbackPoller {
    /// Starts polling every `interval`.
    ///
    /// `fetch` returns the buffered callbacks (`--` separated) or `None`;
    /// `deliver` receives each callback in order.
    pub fn start<F, D>(
        thread_name: impl Into<String>,
        interval: Duration,
        fetch: F,
        deliver: D,
    ) -> std::io::Result<Self>
    where
        F: Fn() -> Option<String> + Send + 'static,
        D: Fn(&str) + Send + 'static,
    {
        let token = CancellationToken::new();
        let task = {
            let token = token.clone();
            TaskHandle::spawn(thread_name, move || {
                while !token.is_cancelled() {
                    if let Some(buffer) = fetch() {
                        for callback in split_polled_callbacks(&buffer) {
                            if token.is_cancelled() {
                                break;
                            }
                            trace!(%callback, "polled callback");
                            deliver(&callback);
                        }
                    }
                    std::thread::sleep(interval);
                }
            })?
        };
        info!(interval_ms = interval.as_millis() as u64, "callback poller started");
        Ok(Self {
            token,
            task: Some(task),
            join_grace: interval * 2,
        })
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancels polling and joins the thread. Idempotent.
    pub fn stop(&mut self) -> Option<JoinOutcome> {
        self.token.cancel();
        let outcome = self.task.take()?.join_timeout(self.join_grace);
        info!(?outcome, "callback poller stopped");
        Some(outcome)
    }
}

impl Drop for CallbackPoller {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for CallbackPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackPoller")
            .field("running", &self.is_running())
            .finish()
    }
}
