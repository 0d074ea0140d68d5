//! One-shot timers kept as deadlines.
//!
//! The connection owns its three timers (response, keepalive, retry) as plain values; the driver
//! sleeps until the earliest armed deadline and reports the expiry back to the client.
use tokio::time::{Duration, Instant};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    /// (Re)arms the timer to fire `after` from now.
    pub fn start(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Disarms the timer, returning whether it was armed. An expiry reported for a timer that
    /// was stopped in the meantime is stale and must be ignored.
    pub fn fire(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Timers {
    pub response: Timer,
    pub keepalive: Timer,
    pub retry: Timer,
}
