use std::time::Duration;

use chrono::Utc;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;

use crate::config::RetryConfig;

/// Upper bound on attempts regardless of configuration
pub const MAX_ATTEMPTS_CEILING: u32 = 5;

/// Retry and backoff policy for an upstream call.
///
/// Pure: it computes delays and classifies statuses but never sleeps or
/// performs I/O, so schedules can be checked without a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_ATTEMPTS_CEILING),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_secs(config.max_delay_secs),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 429 and any 5xx are worth another try
    pub fn is_retryable_status(&self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    /// Exponential backoff for the wait after a failed `attempt` (1-based):
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before the next attempt. A server hint wins over the computed
    /// backoff but is still capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.max_delay),
            None => self.backoff(attempt),
        }
    }

    /// The backoff waits a run would observe if every attempt failed
    /// without a server hint.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|a| self.backoff(a)).collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Read a rate-limit hint from `Retry-After` (seconds) or, failing that,
/// `X-RateLimit-Reset` (epoch seconds).
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    };

    if let Some(secs) = header("retry-after").and_then(|v| v.parse::<u64>().ok()) {
        return Some(Duration::from_secs(secs));
    }

    let reset = header("x-ratelimit-reset").and_then(|v| v.parse::<i64>().ok())?;
    let wait = reset - Utc::now().timestamp() + 1;
    Some(Duration::from_secs(wait.max(0) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(1))
    }

    #[test]
    fn test_backoff_doubles_until_cap() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(p.backoff(4), Duration::from_millis(800));
        assert_eq!(p.backoff(5), Duration::from_secs(1));
        assert_eq!(p.backoff(40), Duration::from_secs(1));
    }

    #[test]
    fn test_schedule_is_monotonic_and_bounded() {
        let p = policy();
        let schedule = p.schedule();
        assert_eq!(schedule.len() as u32, p.max_attempts() - 1);
        assert!(schedule.windows(2).all(|w| w[0] <= w[1]));
        assert!(schedule.windows(2).any(|w| w[0] < w[1]));
    }

    #[test]
    fn test_attempts_are_clamped() {
        let p = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1));
        assert_eq!(p.max_attempts(), 1);
        assert!(p.schedule().is_empty());

        let p = RetryPolicy::new(50, Duration::from_millis(1), Duration::from_millis(1));
        assert_eq!(p.max_attempts(), MAX_ATTEMPTS_CEILING);
    }

    #[test]
    fn test_retryable_statuses() {
        let p = policy();
        assert!(p.is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(p.is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(p.is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!p.is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!p.is_retryable_status(StatusCode::FORBIDDEN));
        assert!(!p.is_retryable_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_server_hint_wins_but_is_capped() {
        let p = policy();
        assert_eq!(
            p.delay_for(1, Some(Duration::from_millis(300))),
            Duration::from_millis(300)
        );
        assert_eq!(p.delay_for(1, Some(Duration::from_secs(90))), Duration::from_secs(1));
        assert_eq!(p.delay_for(2, None), Duration::from_millis(200));
    }

    #[test]
    fn test_parse_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);

        headers.insert("retry-after", HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_parse_rate_limit_reset() {
        let mut headers = HeaderMap::new();
        let reset = Utc::now().timestamp() + 10;
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&reset.to_string()).unwrap(),
        );
        let wait = parse_retry_after(&headers).unwrap();
        assert!(wait >= Duration::from_secs(9) && wait <= Duration::from_secs(11));

        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-reset", HeaderValue::from_static("1"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }
}
