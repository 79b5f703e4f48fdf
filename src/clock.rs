use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local, SecondsFormat};

/// Time source and blocking wait used by the pipeline.
pub trait Clock {
    fn now(&self) -> DateTime<Local>;
    fn sleep(&self, duration: Duration);

    fn timestamp(&self) -> String {
        self.now().to_rfc3339_opts(SecondsFormat::Micros, false)
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> DateTime<Local> {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    struct FixedClock;

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Local> {
            Local.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap()
        }

        fn sleep(&self, _duration: Duration) {}
    }

    #[test]
    fn system_clock_skips_zero_sleep() {
        let started = std::time::Instant::now();
        SystemClock.sleep(Duration::ZERO);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let clock = FixedClock;
        let stamp = clock.timestamp();
        assert!(stamp.starts_with("2025-03-01T08:30:00.000000"));
        assert!(chrono::DateTime::parse_from_rfc3339(&stamp).is_ok());
    }
}
