//! Shared retry/backoff schedule.

use rand::Rng;
use std::time::Duration;

/// Maximum exponent (2^11 = 2048 seconds max backoff).
const MAX_RETRY_EXPONENT: u32 = 11;

/// Calculate the delay before the next retry.
///
/// Exponential: 2^retry_count seconds, capped at 2^11.
pub fn retry_delay(retry_count: u32) -> Duration {
    let seconds = 2u64.pow(retry_count.min(MAX_RETRY_EXPONENT));
    Duration::from_secs(seconds)
}

/// Apply ±20% jitter so reconnecting clients don't thunder in lockstep.
pub fn with_jitter(delay: Duration) -> Duration {
    let factor = rand::rng().random_range(0.8..=1.2);
    delay.mul_f64(factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_schedule() {
        assert_eq!(retry_delay(0), Duration::from_secs(1));
        assert_eq!(retry_delay(1), Duration::from_secs(2));
        assert_eq!(retry_delay(2), Duration::from_secs(4));
        assert_eq!(retry_delay(10), Duration::from_secs(1024));
        assert_eq!(retry_delay(11), Duration::from_secs(2048));
        // Capped at the max exponent
        assert_eq!(retry_delay(12), Duration::from_secs(2048));
        assert_eq!(retry_delay(100), Duration::from_secs(2048));
    }

    #[test]
    fn jitter_stays_in_band() {
        let base = Duration::from_secs(10);
        for _ in 0..100 {
            let jittered = with_jitter(base);
            assert!(jittered >= Duration::from_secs(8));
            assert!(jittered <= Duration::from_secs(12));
        }
    }
}
