//! Reconnection backoff and authentication retry accounting.

use std::time::Duration;

use backon::BackoffBuilder;

use crate::config::types::ReconnectSettings;

/// Build the reconnect backoff iterator: exponential with jitter, capped,
/// unlimited retries. The session runner recreates it after reaching Ready
/// so the delay resets to base.
pub fn reconnect_backoff(settings: &ReconnectSettings) -> impl Iterator<Item = Duration> {
    backon::ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(settings.base_delay_secs))
        .with_max_delay(Duration::from_secs(settings.max_delay_secs))
        .with_factor(2.0)
        .with_jitter()
        .without_max_times()
        .build()
}

/// Bounded counter for authentication failures.
///
/// Unlike transient network errors, a refused login only gets a small
/// number of retries before the session runner gives up and escalates.
#[derive(Debug)]
pub struct AuthAttempts {
    limit: u32,
    failures: u32,
}

impl AuthAttempts {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            failures: 0,
        }
    }

    /// Record one refused login. Returns true when the limit is reached
    /// and the failure should be treated as fatal.
    pub fn record_failure(&mut self) -> bool {
        self.failures = self.failures.saturating_add(1);
        self.failures >= self.limit
    }

    /// Reset after a successful login.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delays_stay_within_bounds() {
        let settings = ReconnectSettings {
            base_delay_secs: 1,
            max_delay_secs: 8,
            auth_retry_limit: 3,
        };
        let delays: Vec<_> = reconnect_backoff(&settings).take(10).collect();

        assert_eq!(delays.len(), 10, "transient retries never run out");
        for delay in &delays {
            assert!(*delay >= Duration::from_secs(1));
            // Jitter adds at most one extra delay on top of the cap.
            assert!(*delay <= Duration::from_secs(16));
        }
    }

    #[test]
    fn test_fresh_backoff_starts_at_base() {
        let settings = ReconnectSettings {
            base_delay_secs: 5,
            max_delay_secs: 300,
            auth_retry_limit: 3,
        };
        // Recreating the iterator is the reset; its first delay is the
        // base delay again (plus jitter below one base).
        let first = reconnect_backoff(&settings).next().unwrap();
        assert!(first >= Duration::from_secs(5));
        assert!(first < Duration::from_secs(10));
    }

    #[test]
    fn test_auth_attempts_exhaust() {
        let mut auth = AuthAttempts::new(3);
        assert!(!auth.record_failure());
        assert!(!auth.record_failure());
        assert!(auth.record_failure());
    }

    #[test]
    fn test_auth_attempts_reset_on_success() {
        let mut auth = AuthAttempts::new(2);
        assert!(!auth.record_failure());
        auth.reset();
        assert!(!auth.record_failure());
        assert_eq!(auth.failures(), 1);
    }
}
