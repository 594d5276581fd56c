//! Retry backoff arithmetic.

use std::time::Duration;

/// Delay before retry number `attempt` (zero-based).
///
/// Formula: `base * 2^attempt`, saturating. No jitter: retries from one
/// client are spaced deterministically.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_per_attempt() {
        let base = Duration::from_millis(300);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(300));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(600));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(1200));
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        let base = Duration::from_secs(u64::MAX / 2);
        assert_eq!(backoff_delay(base, 4), Duration::MAX);
        assert!(backoff_delay(Duration::from_millis(1), 64) > Duration::ZERO);
    }

    #[test]
    fn zero_base_never_waits() {
        assert_eq!(backoff_delay(Duration::ZERO, 5), Duration::ZERO);
    }
}
