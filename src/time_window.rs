// src/time_window.rs
// Age limits from config and CLI flags, saturating instead of wrapping

use chrono::{DateTime, Duration, Utc};

/// `hours` as a duration. Values chrono cannot represent become `Duration::MAX`.
pub fn hours(hours: u64) -> Duration {
    i64::try_from(hours)
        .ok()
        .and_then(Duration::try_hours)
        .unwrap_or(Duration::MAX)
}

pub fn days(days: u64) -> Duration {
    i64::try_from(days)
        .ok()
        .and_then(Duration::try_days)
        .unwrap_or(Duration::MAX)
}

/// `now - span`, clamped to the earliest representable instant.
pub fn cutoff(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_values_are_exact() {
        assert_eq!(hours(24), Duration::hours(24));
        assert_eq!(days(7), Duration::days(7));
    }

    #[test]
    fn test_huge_values_saturate() {
        assert_eq!(hours(u64::MAX), Duration::MAX);
        assert_eq!(hours(1 << 50), Duration::MAX);
        assert_eq!(days(u64::MAX), Duration::MAX);
        assert!(hours(1 << 40) > Duration::zero());
    }

    #[test]
    fn test_cutoff_clamps_to_min() {
        let now = Utc::now();
        assert_eq!(cutoff(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
        assert_eq!(cutoff(now, hours(u64::MAX)), DateTime::<Utc>::MIN_UTC);
        assert_eq!(cutoff(now, Duration::hours(1)), now - Duration::hours(1));
    }
}
