//! Reconnect policy.

use std::time::Duration;

/// Default delays before each automatic reconnect attempt, in milliseconds.
pub const DEFAULT_RECONNECT_DELAYS_MS: [u64; 4] = [0, 2_000, 10_000, 30_000];

/// Default wait between attempts of the initial (or manually restarted) connect.
pub const DEFAULT_START_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Fixed backoff sequence used after a transport drop.
///
/// Attempt `n` waits `delays[n]` before connecting. Once every delay has been
/// used the connection settles into `Disconnected`; the policy never escalates
/// beyond its own sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delays: Vec<Duration>,
}

impl ReconnectPolicy {
    /// Build a policy from explicit delays.
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Build a policy from millisecond delays.
    pub fn from_millis(delays: &[u64]) -> Self {
        Self::new(delays.iter().copied().map(Duration::from_millis).collect())
    }

    /// A policy that never reconnects automatically.
    pub fn disabled() -> Self {
        Self::new(Vec::new())
    }

    /// Delay before the given (0-indexed) attempt, or `None` once exhausted.
    pub fn delay_for_attempt(&self, attempt: usize) -> Option<Duration> {
        self.delays.get(attempt).copied()
    }

    /// Number of automatic attempts this policy allows.
    pub fn max_attempts(&self) -> usize {
        self.delays.len()
    }

    /// All delays in order.
    pub fn delays(&self) -> &[Duration] {
        &self.delays
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::from_millis(&DEFAULT_RECONNECT_DELAYS_MS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for_attempt(0), Some(Duration::ZERO));
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_secs(10)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_secs(30)));
        assert_eq!(policy.delay_for_attempt(4), None);
    }

    #[test]
    fn test_disabled() {
        let policy = ReconnectPolicy::disabled();
        assert_eq!(policy.max_attempts(), 0);
        assert!(policy.delay_for_attempt(0).is_none());
    }
}
