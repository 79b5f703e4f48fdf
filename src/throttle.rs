use std::time::Duration;

use crate::app::{ProgressEvent, ProgressSink};
use crate::clock::Clock;

/// Fixed pause before every unit except the first one of a run.
#[derive(Debug, Clone)]
pub struct Throttle {
    delay: Duration,
    primed: bool,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            primed: false,
        }
    }

    /// Called once per unit, so each dimension value of an expanded query is paced too.
    /// Returns the wait that was applied, if any.
    pub fn pace(&mut self, clock: &dyn Clock, sink: &dyn ProgressSink) -> Option<Duration> {
        if !self.primed {
            self.primed = true;
            return None;
        }
        sink.event(ProgressEvent::Throttle { delay: self.delay });
        clock.sleep(self.delay);
        Some(self.delay)
    }
}
