//! Retry policy for registry requests

use rand::Rng;
use std::time::Duration;

/// Attempts before a transient failure becomes fatal
pub const MAX_ATTEMPTS: u32 = 6;

/// Base delay before the first retry
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Exponential growth factor per attempt
const FACTOR: u32 = 2;

/// Jitter fraction applied on top of the computed delay
const JITTER: f64 = 0.2;

/// The delay before retry number `attempt` (zero-based), with jitter
pub fn backoff(attempt: u32) -> Duration {
    let base = BASE_DELAY * FACTOR.saturating_pow(attempt);
    let jitter = 1.0 + rand::thread_rng().gen_range(-JITTER..=JITTER);
    base.mul_f64(jitter)
}

/// Parse a `Retry-After` header value, seconds form only
pub fn retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially() {
        for attempt in 0..4 {
            let d = backoff(attempt).as_secs_f64();
            let base = (1 << attempt) as f64;
            assert!(d >= base * (1.0 - JITTER) - f64::EPSILON, "attempt {attempt}: {d}");
            assert!(d <= base * (1.0 + JITTER) + f64::EPSILON, "attempt {attempt}: {d}");
        }
    }

    #[test]
    fn retry_after_seconds() {
        assert_eq!(retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(retry_after(" 10 "), Some(Duration::from_secs(10)));
        assert_eq!(retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }
}
