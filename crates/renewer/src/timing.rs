//! Renewal timing
//!
//! A staple is renewed once a fraction T1 of its validity window
//! (`producedAt` to `nextUpdate`) has passed. The point is jittered by
//! ±10% so many certificates, or many renewer processes, do not hit a
//! responder at the same moment.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rand::Rng;

use crate::ocsp::StapleTimes;

/// Lower bound of the multiplicative jitter
pub const JITTER_MIN: f64 = 0.9;

/// Upper bound of the multiplicative jitter
pub const JITTER_MAX: f64 = 1.1;

/// Retry after a responder answered "tryLater"
pub const TRY_LATER_RETRY: Duration = Duration::from_secs(30 * 60);

/// Retry when a fresh staple carries no usable timers
pub const NO_TIMERS_RETRY: Duration = Duration::from_secs(6 * 3600);

/// Retry when a fresh staple is already past its nextUpdate
pub const EXPIRED_ON_ARRIVAL_RETRY: Duration = Duration::from_secs(10 * 60);

/// Why a renewal is due now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueReason {
    /// producedAt or nextUpdate is missing
    MissingTimers,
    /// nextUpdate has passed
    Expired,
    /// The jittered T1 point has passed
    PastRetryPoint,
}

/// Outcome of the T1 check on an existing staple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Due {
    Now(DueReason),
    /// Not yet; check again at this time
    Later(DateTime<Utc>),
}

/// Multiply `base` by a factor drawn uniformly from [0.9, 1.1]
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, base: TimeDelta) -> TimeDelta {
    let factor = rng.gen_range(JITTER_MIN..=JITTER_MAX);
    TimeDelta::milliseconds((base.num_milliseconds() as f64 * factor).round() as i64)
}

/// `now + jitter(delay)`
pub fn retry_in<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    let base = TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
    now + jitter(rng, base)
}

/// `producedAt + jitter(T1 × (nextUpdate − producedAt))`
pub fn retry_after<R: Rng + ?Sized>(
    rng: &mut R,
    produced_at: DateTime<Utc>,
    next_update: DateTime<Utc>,
    t1: f64,
) -> DateTime<Utc> {
    let window = next_update - produced_at;
    let offset = TimeDelta::milliseconds((window.num_milliseconds() as f64 * t1).round() as i64);
    produced_at + jitter(rng, offset)
}

/// Decide whether an existing staple needs renewing at `now`
///
/// `registered` is the check time already scheduled for the certificate.
/// When present it stands in for a fresh jitter draw, so a firing timer is
/// honoured instead of being pushed out again.
pub fn renewal_due<R: Rng + ?Sized>(
    rng: &mut R,
    times: &StapleTimes,
    t1: f64,
    now: DateTime<Utc>,
    registered: Option<DateTime<Utc>>,
) -> Due {
    let (Some(produced_at), Some(next_update)) = (times.produced_at, times.next_update) else {
        return Due::Now(DueReason::MissingTimers);
    };
    if next_update <= now {
        return Due::Now(DueReason::Expired);
    }

    let at = registered.unwrap_or_else(|| retry_after(rng, produced_at, next_update, t1));
    if now >= at {
        Due::Now(DueReason::PastRetryPoint)
    } else {
        Due::Later(at)
    }
}

/// Next check after a fresh staple was stored
pub fn next_check_after_fetch<R: Rng + ?Sized>(
    rng: &mut R,
    times: &StapleTimes,
    t1: f64,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    match renewal_due(rng, times, t1, now, None) {
        Due::Later(at) => at,
        Due::Now(DueReason::MissingTimers) => retry_in(rng, now, NO_TIMERS_RETRY),
        Due::Now(DueReason::Expired | DueReason::PastRetryPoint) => {
            retry_in(rng, now, EXPIRED_ON_ARRIVAL_RETRY)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn times(produced: i64, next: Option<i64>) -> StapleTimes {
        StapleTimes {
            produced_at: Some(t(produced)),
            this_update: Some(t(produced)),
            next_update: next.map(t),
        }
    }

    const DAY: i64 = 86_400;

    #[test]
    fn test_missing_or_expired_is_due() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            renewal_due(&mut rng, &times(0, None), 0.5, t(10), None),
            Due::Now(DueReason::MissingTimers)
        );
        assert_eq!(
            renewal_due(&mut rng, &StapleTimes::default(), 0.5, t(10), None),
            Due::Now(DueReason::MissingTimers)
        );
        assert_eq!(
            renewal_due(&mut rng, &times(0, Some(DAY)), 0.5, t(DAY), Some(t(2 * DAY))),
            Due::Now(DueReason::Expired)
        );
    }

    #[test]
    fn test_half_way_window() {
        let mut rng = StdRng::seed_from_u64(7);
        let staple = times(0, Some(10 * DAY));

        match renewal_due(&mut rng, &staple, 0.5, t(DAY), None) {
            Due::Later(at) => {
                assert!(at >= t(45 * DAY / 10) && at <= t(55 * DAY / 10), "{}", at);
            }
            other => panic!("expected Later, got {:?}", other),
        }
        assert_eq!(
            renewal_due(&mut rng, &staple, 0.5, t(6 * DAY), None),
            Due::Now(DueReason::PastRetryPoint)
        );
    }

    #[test]
    fn test_registered_time_is_not_redrawn() {
        let staple = times(0, Some(10 * DAY));
        let registered = t(45 * DAY / 10);

        // Whatever the draw, the scheduled time decides
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert_eq!(
                renewal_due(&mut rng, &staple, 0.5, registered, Some(registered)),
                Due::Now(DueReason::PastRetryPoint)
            );
            assert_eq!(
                renewal_due(&mut rng, &staple, 0.5, t(DAY), Some(registered)),
                Due::Later(registered)
            );
        }
    }

    #[test]
    fn test_next_check_fallbacks() {
        let mut rng = StdRng::seed_from_u64(1);
        let now = t(0);

        let no_timers = next_check_after_fetch(&mut rng, &times(0, None), 0.5, now);
        assert!(no_timers >= t(6 * 3600 * 9 / 10) && no_timers <= t(6 * 3600 * 11 / 10));

        let expired = next_check_after_fetch(&mut rng, &times(-DAY, Some(-10)), 0.5, now);
        assert!(expired >= t(540) && expired <= t(660));

        let normal = next_check_after_fetch(&mut rng, &times(0, Some(10 * DAY)), 0.5, now);
        assert!(normal >= t(45 * DAY / 10) && normal <= t(55 * DAY / 10));
    }

    #[test]
    fn test_jitter_of_zero() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(jitter(&mut rng, TimeDelta::zero()), TimeDelta::zero());
    }

    proptest! {
        #[test]
        fn prop_retry_after_within_jitter_bounds(
            t1 in 0.10f64..=0.95,
            produced in 0i64..1_000_000,
            window in 1i64..(400 * DAY),
            seed in any::<u64>(),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let produced_at = t(produced);
            let next_update = t(produced + window);
            let at = retry_after(&mut rng, produced_at, next_update, t1);

            let exact = (window * 1000) as f64 * t1;
            let low = produced_at + TimeDelta::milliseconds((exact * JITTER_MIN).floor() as i64 - 2);
            let high = produced_at + TimeDelta::milliseconds((exact * JITTER_MAX).ceil() as i64 + 2);
            prop_assert!(at >= low && at <= high, "{} not in [{}, {}]", at, low, high);
        }

        #[test]
        fn prop_try_later_retry_is_about_thirty_minutes(seed in any::<u64>()) {
            let mut rng = StdRng::seed_from_u64(seed);
            let at = retry_in(&mut rng, t(0), TRY_LATER_RETRY);
            prop_assert!(at >= t(27 * 60) && at <= t(33 * 60));
        }
    }
}
