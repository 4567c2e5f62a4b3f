//! Rate limiting for auto-scroll requests.

use std::time::{Duration, Instant};

/// Leading-edge throttle: the first request in a window fires, the rest are
/// dropped until `interval` has elapsed.
#[derive(Debug, Clone)]
pub struct ScrollThrottle {
    interval: Duration,
    last: Option<Instant>,
    suppressed: usize,
}

impl ScrollThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
            suppressed: 0,
        }
    }

    /// Whether a scroll requested at `now` should fire.
    pub fn request(&mut self, now: Instant) -> bool {
        let ready = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        };
        if ready {
            self.last = Some(now);
        } else {
            self.suppressed += 1;
        }
        ready
    }

    /// Requests dropped since creation.
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }
}
