//! Scan-loop timing: poll interval and init rate limiting.

use std::time::{Duration, Instant};

/// Poll interval for the scan loop when hotplug callbacks are not
/// available, and the upper bound on one event wait when they are.
pub const SCAN_INTERVAL: Duration = Duration::from_millis(500);

/// Minimum spacing between full driver restarts.
const INIT_WINDOW: Duration = Duration::from_secs(1);

/// Rate limiter for repeated init calls.
///
/// Config churn can request several restarts in quick succession; only
/// the first within a window does real work, the rest are absorbed. A
/// first-ever call always passes, and calls made while the driver is
/// stopped always pass (there is nothing to thrash).
#[derive(Debug, Default)]
pub struct InitLimiter {
    last_pass: Option<Instant>,
}

impl InitLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a restart may proceed. `active` is the current run state;
    /// inactive drivers are never throttled.
    pub fn allow(&mut self, active: bool) -> bool {
        let now = Instant::now();
        if active {
            if let Some(last) = self.last_pass {
                if now.duration_since(last) < INIT_WINDOW {
                    return false;
                }
            }
        }
        self.last_pass = Some(now);
        true
    }

    /// Forget the last pass so the next call is never throttled.
    pub fn clear(&mut self) {
        self.last_pass = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_always_passes() {
        let mut limiter = InitLimiter::new();
        assert!(limiter.allow(true));
    }

    #[test]
    fn rapid_second_call_is_absorbed_while_active() {
        let mut limiter = InitLimiter::new();
        assert!(limiter.allow(true));
        assert!(!limiter.allow(true));
    }

    #[test]
    fn inactive_driver_is_never_throttled() {
        let mut limiter = InitLimiter::new();
        assert!(limiter.allow(false));
        assert!(limiter.allow(false));
        assert!(limiter.allow(false));
    }

    #[test]
    fn clear_resets_the_window() {
        let mut limiter = InitLimiter::new();
        assert!(limiter.allow(true));
        limiter.clear();
        assert!(limiter.allow(true));
    }

    #[test]
    fn passes_again_after_the_window() {
        let mut limiter = InitLimiter::new();
        limiter.last_pass = Some(Instant::now() - INIT_WINDOW);
        assert!(limiter.allow(true));
    }
}
