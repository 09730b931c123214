//! Fetch State Module
//!
//! Per-key bookkeeping of fetch attempts, failures and the backoff window.

use tokio::time::Instant;

use crate::cache::RetryPolicy;

// == Fetch State ==
/// Fetch lifecycle of one key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchState {
    /// A fetch for the key is currently running
    pub in_flight: bool,
    /// When the last fetch was started
    pub last_attempt_at: Option<Instant>,
    /// Failed fetches since the last success
    pub consecutive_failures: u32,
    /// Background refreshes are held off until this instant
    pub retry_not_before: Option<Instant>,
}

impl FetchState {
    /// Marks a fetch as started.
    pub fn begin_attempt(&mut self, now: Instant) {
        self.in_flight = true;
        self.last_attempt_at = Some(now);
    }

    /// Records a successful fetch, clearing failure bookkeeping.
    pub fn record_success(&mut self) {
        self.in_flight = false;
        self.consecutive_failures = 0;
        self.retry_not_before = None;
    }

    /// Records a failed fetch and opens the backoff window.
    pub fn record_failure(&mut self, now: Instant, policy: &RetryPolicy) {
        self.in_flight = false;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.retry_not_before = Some(now + policy.backoff_window(self.consecutive_failures));
    }

    /// True while voluntary refreshes must wait.
    pub fn in_backoff(&self, now: Instant) -> bool {
        self.retry_not_before.is_some_and(|deadline| now < deadline)
    }

    /// True when the next fetch may use the inner retry loop.
    pub fn allows_retry(&self, policy: &RetryPolicy) -> bool {
        self.consecutive_failures < policy.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_failure_opens_backoff_window() {
        let policy = RetryPolicy::default();
        let now = Instant::now();
        let mut state = FetchState::default();

        state.begin_attempt(now);
        assert!(state.in_flight);

        state.record_failure(now, &policy);
        assert!(!state.in_flight);
        assert_eq!(state.consecutive_failures, 1);
        assert_eq!(state.retry_not_before, Some(now + Duration::from_millis(1500)));
        assert!(state.in_backoff(now + Duration::from_millis(1499)));
        assert!(!state.in_backoff(now + Duration::from_millis(1500)));
    }

    #[test]
    fn test_backoff_window_grows_with_failures() {
        let policy = RetryPolicy::default();
        let now = Instant::now();
        let mut state = FetchState::default();

        state.record_failure(now, &policy);
        state.record_failure(now, &policy);
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.retry_not_before, Some(now + Duration::from_millis(2250)));
    }

    #[test]
    fn test_success_resets_failures() {
        let policy = RetryPolicy::default();
        let now = Instant::now();
        let mut state = FetchState::default();

        state.record_failure(now, &policy);
        state.begin_attempt(now);
        state.record_success();

        assert_eq!(state.consecutive_failures, 0);
        assert!(state.retry_not_before.is_none());
        assert!(!state.in_backoff(now));
        assert!(!state.in_flight);
    }

    #[test]
    fn test_retry_disabled_after_max_failures() {
        let policy = RetryPolicy::default();
        let now = Instant::now();
        let mut state = FetchState::default();

        for _ in 0..policy.max_retries {
            assert!(state.allows_retry(&policy));
            state.record_failure(now, &policy);
        }
        assert!(!state.allows_retry(&policy));
    }
}
