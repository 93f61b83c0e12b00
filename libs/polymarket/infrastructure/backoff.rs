//! Small exponential-backoff helper shared by any long-lived loop that
//! needs to back off on consecutive errors (the arb scanner's
//! `min(300, poll * 2^errors)` policy and the oracle stream's 5s->120s
//! reconnect schedule are both instances of this shape).

use std::time::Duration;

/// `base * 2^errors`, capped at `max`. `errors = 0` returns `base`.
pub fn exponential(base: Duration, max: Duration, errors: u32) -> Duration {
    let factor = 1u64.checked_shl(errors.min(32)).unwrap_or(u64::MAX);
    let scaled = base.as_secs_f64() * factor as f64;
    Duration::from_secs_f64(scaled.min(max.as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_errors_returns_base() {
        let d = exponential(Duration::from_secs(5), Duration::from_secs(120), 0);
        assert_eq!(d, Duration::from_secs(5));
    }

    #[test]
    fn doubles_each_failure_and_caps() {
        assert_eq!(
            exponential(Duration::from_secs(5), Duration::from_secs(120), 1),
            Duration::from_secs(10)
        );
        assert_eq!(
            exponential(Duration::from_secs(5), Duration::from_secs(120), 2),
            Duration::from_secs(20)
        );
        // 5 * 2^5 = 160, capped at 120
        assert_eq!(
            exponential(Duration::from_secs(5), Duration::from_secs(120), 5),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn arb_scanner_backoff_matches_spec_formula() {
        // next_scan_allowed = now + min(300, poll * 2^errors)
        let poll = Duration::from_secs_f64(8.0);
        let max = Duration::from_secs(300);
        assert_eq!(exponential(poll, max, 0), poll);
        assert!(exponential(poll, max, 10) <= max);
    }
}
