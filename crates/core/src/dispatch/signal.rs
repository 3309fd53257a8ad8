use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Cooperative stop flag shared between the engine and exclusive actions.
///
/// Exclusive actions are never killed. They must poll [`StopSignal::is_set`]
/// (or sleep with [`StopSignal::wait_timeout`]) and return once it is set.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter. Idempotent.
    pub fn set(&self) {
        let (flag, condvar) = &*self.inner;
        *flag.lock() = true;
        condvar.notify_all();
    }

    pub fn clear(&self) {
        *self.inner.0.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Block until the flag is raised.
    pub fn wait(&self) {
        let (flag, condvar) = &*self.inner;
        let mut set = flag.lock();
        while !*set {
            condvar.wait(&mut set);
        }
    }

    /// Sleep for up to `timeout`, waking early if the flag is raised.
    ///
    /// Returns whether the flag is set, so action loops can be written as
    /// `while !stop.wait_timeout(interval) { ... }`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, condvar) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut set = flag.lock();
        while !*set {
            if condvar.wait_until(&mut set, deadline).timed_out() {
                break;
            }
        }
        *set
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn test_set_and_clear() {
        let stop = StopSignal::new();
        assert!(!stop.is_set());
        stop.set();
        stop.set();
        assert!(stop.is_set());
        stop.clear();
        assert!(!stop.is_set());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let stop = StopSignal::new();
        let start = Instant::now();
        assert!(!stop.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn test_set_wakes_waiter() {
        let stop = StopSignal::new();
        let waiter = {
            let stop = stop.clone();
            thread::spawn(move || stop.wait())
        };
        thread::sleep(Duration::from_millis(10));
        stop.set();
        waiter.join().unwrap();
        assert!(stop.wait_timeout(Duration::from_secs(5)));
    }
}
