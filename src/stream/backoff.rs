//! Reconnect backoff policy for stream clients
//!
//! Clients that lose their stream connection retry with capped exponential
//! delays and give up after a bounded number of attempts, surfacing a
//! disconnected state to their caller.

use std::time::Duration;

/// Growth factor between consecutive attempts
const BACKOFF_MULTIPLIER: f64 = 1.5;

/// Capped exponential reconnect schedule
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Attempts before giving up entirely
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy with explicit bounds
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
        }
    }

    /// Delay before retry number `attempt` (0-based), or None once the
    /// attempt budget is exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }

        let factor = BACKOFF_MULTIPLIER.powi(attempt as i32);
        let delay = self.base_delay.mul_f64(factor);
        Some(delay.min(self.max_delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_grow_geometrically() {
        let policy = ReconnectPolicy::default();

        assert_eq!(policy.delay_for(0), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_for(1), Some(Duration::from_millis(1500)));
        assert_eq!(policy.delay_for(2), Some(Duration::from_millis(2250)));
    }

    #[test]
    fn test_delay_caps_at_max() {
        let policy = ReconnectPolicy {
            max_attempts: 100,
            ..ReconnectPolicy::default()
        };

        // 1.5^20 seconds is far past the cap
        assert_eq!(policy.delay_for(20), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay_for(99), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let policy = ReconnectPolicy::default();

        assert!(policy.delay_for(9).is_some());
        assert!(policy.delay_for(10).is_none());
        assert!(policy.delay_for(11).is_none());
    }
}
