use std::time::Duration;

use parking_lot::{Condvar, Mutex, MutexGuard};

/// A single coordination lock plus the condition variable its waiters park on.
///
/// Every state change that a waiter may care about goes through [`Coordinator::update`],
/// which signals the condition variable after releasing the lock.
pub struct Coordinator<T> {
    state: Mutex<T>,
    signal: Condvar,
}

impl<T> Coordinator<T> {
    pub fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
            signal: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock()
    }

    /// Reads under the lock without waking anyone.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.state.lock();
        f(&guard)
    }

    /// Mutates under the lock, then wakes every waiter.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = {
            let mut guard = self.state.lock();
            f(&mut guard)
        };
        self.signal.notify_all();
        result
    }

    pub fn notify_all(&self) {
        self.signal.notify_all();
    }

    /// Parks on the condition variable for at most `timeout`.
    ///
    /// Returns `true` if the wait timed out without a signal.
    pub fn wait_for(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) -> bool {
        self.signal.wait_for(guard, timeout).timed_out()
    }
}

impl<T: Default> Default for Coordinator<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> std::fmt::Debug for Coordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("locked", &self.state.is_locked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::Coordinator;

    #[test]
    fn wait_times_out_without_signal() {
        let c = Coordinator::new(0u32);
        let mut guard = c.lock();
        let start = Instant::now();
        assert!(c.wait_for(&mut guard, Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn update_wakes_waiter() {
        let c = Arc::new(Coordinator::new(false));
        let waiter = {
            let c = Arc::clone(&c);
            thread::spawn(move || {
                let deadline = Instant::now() + Duration::from_secs(5);
                let mut guard = c.lock();
                while !*guard && Instant::now() < deadline {
                    c.wait_for(&mut guard, Duration::from_millis(100));
                }
                *guard
            })
        };
        thread::sleep(Duration::from_millis(10));
        c.update(|flag| *flag = true);
        assert!(waiter.join().unwrap());
    }
}
