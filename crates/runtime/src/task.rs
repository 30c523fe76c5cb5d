use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

/// Cooperative cancellation flag shared between an owner and its tasks.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a [`TaskHandle`] ended when it was joined.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Finished,
    Panicked,
    /// The grace period expired; the thread keeps running detached.
    Detached,
}

#[derive(Default)]
struct Completion {
    done: Mutex<bool>,
    signal: Condvar,
}

struct CompletionGuard(Arc<Completion>);

impl Drop for CompletionGuard {
    // Runs on normal return and on unwind alike.
    fn drop(&mut self) {
        *self.0.done.lock() = true;
        self.0.signal.notify_all();
    }
}

/// A named OS thread that can be joined with a bounded grace period.
pub struct TaskHandle {
    name: String,
    completion: Arc<Completion>,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn spawn<F>(name: impl Into<String>, f: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let completion = Arc::new(Completion::default());
        let guard = CompletionGuard(Arc::clone(&completion));
        let join = thread::Builder::new().name(name.clone()).spawn(move || {
            let _guard = guard;
            f();
        })?;
        debug!(task = %name, "spawned");
        Ok(Self {
            name,
            completion,
            join: Some(join),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        *self.completion.done.lock()
    }

    /// Waits up to `grace` for the thread to finish, then joins it or detaches it.
    pub fn join_timeout(mut self, grace: Duration) -> JoinOutcome {
        {
            let mut done = self.completion.done.lock();
            if !*done {
                self.completion.signal.wait_for(&mut done, grace);
            }
            if !*done {
                warn!(task = %self.name, grace_ms = grace.as_millis() as u64, "did not stop in time, detaching");
                // Dropping the JoinHandle detaches the thread.
                self.join.take();
                return JoinOutcome::Detached;
            }
        }
        self.join_now()
    }

    /// Blocks until the thread has finished.
    pub fn join(mut self) -> JoinOutcome {
        self.join_now()
    }

    fn join_now(&mut self) -> JoinOutcome {
        match self.join.take().map(JoinHandle::join) {
            Some(Err(_)) => {
                warn!(task = %self.name, "panicked");
                JoinOutcome::Panicked
            }
            _ => JoinOutcome::Finished,
        }
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("name", &self.name)
            .field("finished", &self.is_finished())
            .finish()
    }
}
