//! Blocking wait used between rate-limited retries.

use std::time::Duration;

/// Blocks the calling thread for a backoff interval.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Real wall-clock sleeper.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
