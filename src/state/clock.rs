use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time for deadline comparisons.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> SystemTime;
}

/// [`Clock`] backed by the operating system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Drop sub-millisecond precision so a deadline survives a round trip through
/// stores that keep milliseconds only.
pub fn truncate_to_millis(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since_epoch) => {
            UNIX_EPOCH + Duration::from_millis(since_epoch.as_millis().min(u64::MAX as u128) as u64)
        }
        Err(_) => time,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_keeps_whole_milliseconds() {
        let time = UNIX_EPOCH + Duration::new(1_700_000_000, 123_456_789);
        assert_eq!(
            truncate_to_millis(time),
            UNIX_EPOCH + Duration::new(1_700_000_000, 123_000_000)
        );
        let exact = UNIX_EPOCH + Duration::from_millis(42);
        assert_eq!(truncate_to_millis(exact), exact);
    }
}
