//! Rate limiting for resource seeks and playhead updates.

use cutline_core::{ProgramTime, RationalTime};
use std::time::{Duration, Instant};

/// Lets at most one resource seek through per interval of wall time.
#[derive(Debug, Clone)]
pub struct ScrubThrottle {
    interval: Duration,
    last_seek: Option<Instant>,
}

impl ScrubThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_seek: None,
        }
    }

    /// Whether a seek may be issued at `now`. Records it if so.
    pub fn allow(&mut self, now: Instant) -> bool {
        let ready = match self.last_seek {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        };
        if ready {
            self.last_seek = Some(now);
        }
        ready
    }

    pub fn reset(&mut self) {
        self.last_seek = None;
    }
}

/// Drops playhead updates that moved less than an interval of program time
/// since the last one reported.
#[derive(Debug, Clone)]
pub struct ProgressCoalescer {
    interval: RationalTime,
    last_reported: Option<ProgramTime>,
}

impl ProgressCoalescer {
    pub fn new(interval: RationalTime) -> Self {
        Self {
            interval,
            last_reported: None,
        }
    }

    /// Whether `position` should be reported. Records it if so.
    pub fn should_report(&mut self, position: ProgramTime) -> bool {
        let due = match self.last_reported {
            Some(last) => (position - last).abs() >= self.interval,
            None => true,
        };
        if due {
            self.last_reported = Some(position);
        }
        due
    }

    /// Restart coalescing from a position that was reported elsewhere.
    pub fn reset(&mut self, position: ProgramTime) {
        self.last_reported = Some(position);
    }
}
