use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::coordinator::Coordinator;
use crate::task::{JoinOutcome, TaskHandle};
use crate::work_queue::{WorkId, WorkQueue, WorkQueueFull};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("worker pool queue is full (max {max_len} pending jobs)")]
    QueueFull { max_len: usize },
    #[error("worker pool has been shut down")]
    ShutDown,
    #[error("cannot spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl From<WorkQueueFull> for PoolError {
    fn from(full: WorkQueueFull) -> Self {
        PoolError::QueueFull {
            max_len: full.max_len,
        }
    }
}

struct PoolState {
    jobs: WorkQueue<Job>,
    running: bool,
}

/// Fixed-size pool of named worker threads fed from a deterministic [`WorkQueue`].
///
/// Jobs with smaller priority values run first. A panicking job is logged and
/// does not take its worker down.
pub struct WorkerPool {
    name: String,
    state: Arc<Coordinator<PoolState>>,
    workers: Mutex<Vec<TaskHandle>>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, threads: usize, max_pending: usize) -> Result<Self, PoolError> {
        let name = name.into();
        let state = Arc::new(Coordinator::new(PoolState {
            jobs: WorkQueue::with_max_len(max_pending),
            running: true,
        }));

        let mut workers = Vec::with_capacity(threads.max(1));
        for index in 0..threads.max(1) {
            let state = Arc::clone(&state);
            let worker_name = format!("{name}-{index}");
            workers.push(TaskHandle::spawn(worker_name, move || run_worker(&state))?);
        }
        debug!(pool = %name, threads = workers.len(), max_pending, "worker pool started");

        Ok(Self {
            name,
            state,
            workers: Mutex::new(workers),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pending(&self) -> usize {
        self.state.read(|s| s.jobs.len())
    }

    /// Queues `job`; smaller `priority` values run earlier.
    pub fn submit<F>(&self, priority: i32, job: F) -> Result<WorkId, PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.state.update(|s| {
            if !s.running {
                return Err(PoolError::ShutDown);
            }
            Ok(s.jobs.try_push(priority, Box::new(job) as Job)?)
        })
    }

    pub fn execute<F>(&self, job: F) -> Result<WorkId, PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(0, job)
    }

    pub fn is_running(&self) -> bool {
        self.state.read(|s| s.running)
    }

    /// Stops accepting work, drops every pending job and joins the workers.
    ///
    /// Workers still busy after `grace` are detached. Returns the number of
    /// dropped jobs. Calling it twice is harmless.
    pub fn shutdown_now(&self, grace: Duration) -> usize {
        let dropped = self.state.update(|s| {
            s.running = false;
            s.jobs.drain().len()
        });

        let start = Instant::now();
        let workers = std::mem::take(&mut *self.workers.lock());
        let mut detached = 0usize;
        for worker in workers {
            let remaining = grace.saturating_sub(start.elapsed());
            if worker.join_timeout(remaining) == JoinOutcome::Detached {
                detached += 1;
            }
        }
        info!(pool = %self.name, dropped, detached, elapsed_ms = start.elapsed().as_millis() as u64, "worker pool stopped");
        dropped
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.state.update(|s| s.running = false);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("pending", &self.pending())
            .finish()
    }
}

fn run_worker(state: &Coordinator<PoolState>) {
    loop {
        let job = {
            let mut guard = state.lock();
            loop {
                if !guard.running {
                    return;
                }
                if let Some((_id, _priority, job)) = guard.jobs.pop_next() {
                    break job;
                }
                state.wait_for(&mut guard, Duration::from_millis(250));
            }
        };

        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("worker job panicked");
        }
    }
}
