use std::time::{Duration, Instant};

/// Tick-driven repeating timer keyed off a caller-supplied monotonic clock.
///
/// The first poll after creation or [`reset`](Self::reset) is due
/// immediately. A timer that is not polled while its interval elapses fires
/// once when polled again; missed periods are not queued.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    interval: Duration,
    next_due: Option<Instant>,
}

impl IntervalTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    /// Returns true if the timer fired at `now`, arming the next period.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now < due => false,
            _ => {
                self.next_due = Some(now + self.interval);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.next_due = None;
    }
}
