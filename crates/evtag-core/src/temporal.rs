//! # Deadlines and Time Helpers

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::error::ValidationError;

/// A caller-supplied deadline.
///
/// Request-handler operations inherit the caller's deadline; a transaction
/// that cannot commit before it passes is rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Instant::now() + timeout,
        }
    }

    /// A deadline at an absolute instant.
    pub fn at(at: Instant) -> Self {
        Self { at }
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Whether the deadline has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.at
    }
}

/// Parse an IANA time zone name such as `America/New_York`.
pub fn parse_time_zone(name: &str) -> Result<Tz, ValidationError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ValidationError::InvalidTimeZone(name.to_string()))
}

/// Format `now` in `tz` as `YYYY_MM_DD_HH_MM`, the suffix used by
/// synthesized officer and team documents.
pub fn timestamp_suffix(now: DateTime<Utc>, tz: Tz) -> String {
    now.with_timezone(&tz).format("%Y_%m_%d_%H_%M").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn expired_deadline_has_no_time_left() {
        let deadline = Deadline::after(Duration::ZERO);
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }

    #[test]
    fn future_deadline_is_live() {
        let deadline = Deadline::after(Duration::from_secs(60));
        assert!(!deadline.is_expired());
        assert!(deadline.remaining() > Duration::from_secs(50));
    }

    #[test]
    fn parses_known_zone_and_rejects_garbage() {
        assert!(parse_time_zone("America/New_York").is_ok());
        assert!(parse_time_zone(" UTC ").is_ok());
        assert_eq!(
            parse_time_zone("Mars/Olympus"),
            Err(ValidationError::InvalidTimeZone("Mars/Olympus".into()))
        );
    }

    #[test]
    fn timestamp_suffix_uses_local_wall_clock() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 2, 5, 0).unwrap();
        let ny = parse_time_zone("America/New_York").unwrap();
        assert_eq!(timestamp_suffix(now, ny), "2024_03_08_21_05");
        assert_eq!(timestamp_suffix(now, Tz::UTC), "2024_03_09_02_05");
    }
}
