//! Thread wake primitive used by the write and scan loops.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Auto-reset event: `set` wakes one pending or future `wait`.
///
/// A `set` that happens before the waiter arrives is not lost — the
/// next `wait` consumes it and returns immediately. Used to signal
/// "rumble data staged" to the write thread and to interrupt the scan
/// loop's poll sleep during shutdown.
#[derive(Default)]
pub struct Event {
    signaled: Mutex<bool>,
    cvar: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the event, waking one waiter.
    pub fn set(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        *signaled = true;
        self.cvar.notify_one();
    }

    /// Block until the event is signaled, then consume the signal.
    pub fn wait(&self) {
        let mut signaled = self.signaled.lock().unwrap();
        while !*signaled {
            signaled = self.cvar.wait(signaled).unwrap();
        }
        *signaled = false;
    }

    /// Block until signaled or `timeout` elapses. Returns `true` if the
    /// event was signaled (and consumed), `false` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut signaled = self.signaled.lock().unwrap();
        if !*signaled {
            let (guard, result) = self
                .cvar
                .wait_timeout_while(signaled, timeout, |s| !*s)
                .unwrap();
            signaled = guard;
            if result.timed_out() && !*signaled {
                return false;
            }
        }
        *signaled = false;
        true
    }

    /// Drop any pending signal without waiting.
    pub fn reset(&self) {
        *self.signaled.lock().unwrap() = false;
    }
}
