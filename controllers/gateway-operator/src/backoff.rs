//! # Fibonacci Backoff
//!
//! Progressive delay between read-patch-write attempts when a status write
//! hits an optimistic-concurrency conflict. Grows more slowly than exponential
//! backoff: conflicts on status subresources usually clear after one re-read.
//!
//! Sequence with the default bounds: 50ms, 50ms, 100ms, 150ms, 250ms, 400ms,
//! 650ms, 800ms (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Previous backoff
    prev: Duration,
    /// Current backoff
    current: Duration,
    /// Maximum backoff
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with the given bounds
    ///
    /// `min` is used for the first two values, `max` caps the sequence.
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;

        let next = self.prev + self.current;
        self.prev = self.current;
        self.current = std::cmp::min(next, self.max);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_fibonacci_backoff_sequence() {
        let mut backoff = FibonacciBackoff::new(ms(50), ms(800));

        assert_eq!(backoff.next_backoff(), ms(50));
        assert_eq!(backoff.next_backoff(), ms(50));
        assert_eq!(backoff.next_backoff(), ms(100));
        assert_eq!(backoff.next_backoff(), ms(150));
        assert_eq!(backoff.next_backoff(), ms(250));
        assert_eq!(backoff.next_backoff(), ms(400));
        assert_eq!(backoff.next_backoff(), ms(650));
        assert_eq!(backoff.next_backoff(), ms(800)); // capped
        assert_eq!(backoff.next_backoff(), ms(800));
    }
}
