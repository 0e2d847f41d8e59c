//! Time source shared by the limiter and the usage ledger.
//!
//! Window and quota computations must use the same clock that stamps usage
//! records, so both are injected from one `Arc<dyn Clock>`.

use parking_lot::Mutex;
use std::sync::Arc;
use time::{Duration, OffsetDateTime, Time, UtcOffset};

/// Source of "now" for admission decisions and ledger writes
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current UTC time, truncated to millisecond precision
    fn now(&self) -> OffsetDateTime;
}

pub type SharedClock = Arc<dyn Clock>;

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        truncate_to_millis(OffsetDateTime::now_utc())
    }
}

/// Manually driven clock for tests and replay tooling
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<OffsetDateTime>,
}

impl ManualClock {
    pub fn new(start: OffsetDateTime) -> Self {
        Self {
            now: Mutex::new(truncate_to_millis(start)),
        }
    }

    pub fn set(&self, at: OffsetDateTime) {
        *self.now.lock() = truncate_to_millis(at);
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = truncate_to_millis(*now + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock()
    }
}

/// Start of the UTC calendar day containing `now`
pub fn utc_day_start(now: OffsetDateTime) -> OffsetDateTime {
    now.to_offset(UtcOffset::UTC).replace_time(Time::MIDNIGHT)
}

pub fn to_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_millis(ms: i64) -> OffsetDateTime {
    OffsetDateTime::from_unix_timestamp_nanos(ms as i128 * 1_000_000)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

fn truncate_to_millis(at: OffsetDateTime) -> OffsetDateTime {
    from_millis(to_millis(at))
}

/// RFC 3339 rendering used in JSON responses
pub fn format_rfc3339(at: OffsetDateTime) -> String {
    at.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_utc_day_start() {
        let now = datetime!(2026-03-14 17:45:12 UTC);
        assert_eq!(utc_day_start(now), datetime!(2026-03-14 00:00:00 UTC));
    }

    #[test]
    fn test_utc_day_start_normalizes_offset() {
        // 01:30 at +02:00 is still the previous day in UTC
        let now = datetime!(2026-03-14 01:30:00 +02:00);
        assert_eq!(utc_day_start(now), datetime!(2026-03-13 00:00:00 UTC));
    }

    #[test]
    fn test_millis_round_trip_truncates() {
        let at = datetime!(2026-01-01 00:00:00.123456 UTC);
        let ms = to_millis(at);
        assert_eq!(from_millis(ms), datetime!(2026-01-01 00:00:00.123 UTC));
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(datetime!(2026-01-01 12:00:00 UTC));
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), datetime!(2026-01-01 12:01:30 UTC));
    }
}
