//! Timestamp freshness policy.
//!
//! A moment is fresh when its timestamp lies within the tolerance of the
//! verifier's wall clock, in either direction, bounds included. This never
//! affects signature verification. There is no distributed clock: callers
//! needing stronger time guarantees must attest time externally.

use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;

use crate::config::MOMENT_TIMESTAMP_TOLERANCE;

use super::record::Moment;

/// `|now - timestamp| <= 5 minutes`.
pub fn is_timestamp_fresh(timestamp: &DateTime<Utc>, now: &DateTime<Utc>) -> bool {
    is_within_tolerance(timestamp, now, MOMENT_TIMESTAMP_TOLERANCE)
}

/// `|now - timestamp| <= tolerance`.
pub fn is_within_tolerance(
    timestamp: &DateTime<Utc>,
    now: &DateTime<Utc>,
    tolerance: StdDuration,
) -> bool {
    let Ok(tolerance) = Duration::from_std(tolerance) else {
        return true;
    };
    let skew = now.signed_duration_since(*timestamp);
    skew <= tolerance && skew >= -tolerance
}

impl Moment {
    /// Freshness of this moment against the local wall clock.
    pub fn is_fresh(&self) -> bool {
        is_timestamp_fresh(&self.timestamp, &Utc::now())
    }

    /// Freshness against an explicit `now`.
    pub fn is_fresh_at(&self, now: &DateTime<Utc>) -> bool {
        is_timestamp_fresh(&self.timestamp, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 21, 22, 0, 0).unwrap()
    }

    #[test]
    fn boundaries_are_inclusive() {
        let now = now();
        assert!(is_timestamp_fresh(&(now - Duration::minutes(5)), &now));
        assert!(is_timestamp_fresh(&(now + Duration::minutes(5)), &now));
        assert!(is_timestamp_fresh(&now, &now));
    }

    #[test]
    fn one_second_past_the_boundary_is_stale() {
        let now = now();
        let five = Duration::minutes(5);
        let one = Duration::seconds(1);
        assert!(!is_timestamp_fresh(&(now - five - one), &now));
        assert!(!is_timestamp_fresh(&(now + five + one), &now));
    }

    #[test]
    fn custom_tolerance() {
        let now = now();
        let ts = now - Duration::seconds(30);
        assert!(is_within_tolerance(&ts, &now, StdDuration::from_secs(30)));
        assert!(!is_within_tolerance(&ts, &now, StdDuration::from_secs(29)));
    }
}
