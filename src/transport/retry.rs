//! Per-request recovery state machine.
//!
//! ```text
//! Sent -> Failed401 -> Refreshing -> Replayed -> Sent ...
//! Sent -> Failed5xx -> Retrying(n) -> Sent ... -> Failed
//! Sent -> NetworkFailed -> Retrying(n) -> Sent ... -> Failed
//! ```

use std::time::Duration;

use serde::Serialize;

use crate::config::RetryConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", content = "attempt", rename_all = "snake_case")]
pub enum RequestPhase {
    Sent,
    Failed401,
    Refreshing,
    Replayed,
    Failed5xx,
    NetworkFailed,
    /// Waiting before attempt `n` (1-indexed retry number)
    Retrying(u32),
    Completed,
    Failed,
}

/// Bounded retry policy shared by 5xx and network failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub network_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            network_delay: Duration::from_millis(2000),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.base_delay(),
            network_delay: config.network_delay(),
        }
    }
}

impl RetryPolicy {
    /// Delay before the `retry`-th retry (1-indexed) of a 5xx failure: `base * 2^retry`.
    pub fn server_error_delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.min(16)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Delay before any retry of a network failure; constant.
    pub fn network_error_delay(&self, _retry: u32) -> Duration {
        self.network_delay
    }

    /// Whether another attempt may follow `attempts_made` attempts
    pub fn allows_another(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// What happened to one logical request, replays and retries included
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RequestTrace {
    pub phases: Vec<RequestPhase>,
    pub delays: Vec<Duration>,
    pub attempts: u32,
    pub refreshes: u32,
    /// Set once the 401 path has replayed this request
    pub retried: bool,
}

impl RequestTrace {
    pub fn enter(&mut self, phase: RequestPhase) {
        self.phases.push(phase);
    }

    pub fn last_phase(&self) -> Option<&RequestPhase> {
        self.phases.last()
    }

    /// Number of retries after 5xx/network failures
    pub fn retries(&self) -> usize {
        self.phases
            .iter()
            .filter(|p| matches!(p, RequestPhase::Retrying(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            network_delay: Duration::from_millis(250),
        }
    }

    #[test]
    fn test_server_error_delay_doubles() {
        let p = policy();
        let delays: Vec<_> = (1..=3).map(|n| p.server_error_delay(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800)
            ]
        );
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_network_delay_is_constant() {
        let p = policy();
        assert_eq!(p.network_error_delay(1), p.network_error_delay(2));
        assert_eq!(p.network_error_delay(2), Duration::from_millis(250));
    }

    #[test]
    fn test_attempt_bound() {
        let p = policy();
        assert!(p.allows_another(1));
        assert!(p.allows_another(2));
        assert!(!p.allows_another(3));
    }

    #[test]
    fn test_huge_retry_index_does_not_overflow() {
        let p = policy();
        assert!(p.server_error_delay(64) >= p.server_error_delay(16));
    }

    #[test]
    fn test_trace_counts_retries() {
        let mut trace = RequestTrace::default();
        trace.enter(RequestPhase::Sent);
        trace.enter(RequestPhase::Failed5xx);
        trace.enter(RequestPhase::Retrying(1));
        trace.enter(RequestPhase::Sent);
        trace.enter(RequestPhase::Completed);
        assert_eq!(trace.retries(), 1);
        assert_eq!(trace.last_phase(), Some(&RequestPhase::Completed));
    }
}
