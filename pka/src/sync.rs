/*++

Licensed under the Apache-2.0 license.

File Name:

    sync.rs

Abstract:

    File contains the synchronization primitives used to gate the PKA core
    and to hand completion from interrupt context to a waiting job.

--*/

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Binary semaphore.
///
/// Unlike a mutex, a `Gate` may be released from a different context than the
/// one that acquired it; the completion interrupt releasing the core-running
/// gate is exactly that hand-off.
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(true),
            cv: Condvar::new(),
        }
    }

    /// Acquire without blocking. Returns `false` if the gate is held.
    pub fn try_acquire(&self) -> bool {
        let mut open = self.open.lock().unwrap();
        if *open {
            *open = false;
            true
        } else {
            false
        }
    }

    /// Block until the gate can be acquired.
    pub fn acquire(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
        *open = false;
    }

    /// Block until the gate can be acquired or `timeout` elapses. Returns
    /// `false` on timeout, leaving the gate untouched.
    pub fn acquire_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut open = self.open.lock().unwrap();
        while !*open {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, res) = self.cv.wait_timeout(open, deadline - now).unwrap();
            open = guard;
            if res.timed_out() && !*open {
                return false;
            }
        }
        *open = false;
        true
    }

    pub fn release(&self) {
        let mut open = self.open.lock().unwrap();
        *open = true;
        self.cv.notify_one();
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-slot completion signal.
///
/// The dispatcher resets it before starting a job and blocks on it; the
/// interrupt handler signals it. Safe to signal from any thread.
pub struct Completion {
    done: Mutex<bool>,
    cv: Condvar,
}

impl Completion {
    pub fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn reset(&self) {
        *self.done.lock().unwrap() = false;
    }

    pub fn signal(&self) {
        let mut done = self.done.lock().unwrap();
        *done = true;
        self.cv.notify_all();
    }

    /// Wait until signalled or `deadline` passes. Returns `false` on timeout.
    pub fn wait_until(&self, deadline: Instant) -> bool {
        let mut done = self.done.lock().unwrap();
        while !*done {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self.cv.wait_timeout(done, deadline - now).unwrap();
            done = guard;
        }
        true
    }
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_gate_exclusion() {
        let gate = Gate::new();
        assert!(gate.try_acquire());
        assert!(!gate.try_acquire());
        gate.release();
        assert!(gate.try_acquire());
    }

    #[test]
    fn test_gate_release_from_other_thread() {
        let gate = Arc::new(Gate::new());
        gate.acquire();
        let g = gate.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            g.release();
        });
        gate.acquire();
        t.join().unwrap();
        gate.release();
    }

    #[test]
    fn test_gate_acquire_timeout() {
        let gate = Gate::new();
        gate.acquire();
        assert!(!gate.acquire_timeout(Duration::from_millis(10)));
        gate.release();
        assert!(gate.acquire_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_completion_signal_before_wait() {
        let c = Completion::new();
        c.signal();
        assert!(c.wait_until(Instant::now() + Duration::from_millis(10)));
    }

    #[test]
    fn test_completion_timeout() {
        let c = Completion::new();
        assert!(!c.wait_until(Instant::now() + Duration::from_millis(10)));
    }

    #[test]
    fn test_completion_cross_thread() {
        let c = Arc::new(Completion::new());
        let c2 = c.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            c2.signal();
        });
        assert!(c.wait_until(Instant::now() + Duration::from_secs(5)));
        t.join().unwrap();
    }
}
