//! Reconnect backoff for the statistics stream.
//!
//! The stream reader never gives up on the engine; this module only decides
//! how long to wait between attempts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Initial backoff duration
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Backoff multiplier (e.g., 2.0 for exponential backoff)
    pub multiplier: f64,
    /// Add jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Exponential backoff state for an unbounded sequence of attempts.
#[derive(Debug)]
pub struct Backoff {
    config: RetryConfig,
    current: Duration,
    attempts: u64,
}

impl Backoff {
    /// Create a backoff starting at the configured initial delay
    pub fn new(config: RetryConfig) -> Self {
        let current = config.initial_backoff;
        Self {
            config,
            current,
            attempts: 0,
        }
    }

    /// Number of delays handed out since the last reset
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Delay before the next attempt; grows the following delay
    pub fn next_delay(&mut self) -> Duration {
        let backoff = self.current;
        self.attempts += 1;

        let grown = Duration::from_secs_f64(backoff.as_secs_f64() * self.config.multiplier);
        self.current = grown.min(self.config.max_backoff);

        if self.config.jitter {
            let jitter_ms = rand::random::<f64>() * backoff.as_millis() as f64 * 0.1;
            backoff + Duration::from_millis(jitter_ms as u64)
        } else {
            backoff
        }
    }

    /// Back to the initial delay after a successful connect
    pub fn reset(&mut self) {
        self.current = self.config.initial_backoff;
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: false,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut backoff = Backoff::new(no_jitter());

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(no_jitter());
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();

        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let mut config = no_jitter();
        config.jitter = true;
        let mut backoff = Backoff::new(config);

        let delay = backoff.next_delay();
        assert!(delay >= Duration::from_millis(100));
        assert!(delay <= Duration::from_millis(110));
    }
}
