use std::time::Duration;

use bvo_core::is_retryable_status;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Exponential backoff for transport failures, throttling and 5xx answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// `attempts` below one still sends the request once.
    pub fn new(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(1)
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.initial_backoff.saturating_mul(1u32 << exponent);
        delay.min(self.max_backoff)
    }

    /// Server-provided hint, capped like any other delay.
    pub fn hinted_delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        hint.map(|hint| hint.min(self.max_backoff))
            .unwrap_or_else(|| self.delay_after(attempt))
    }

    pub fn should_retry_status(&self, status: u16, attempt: u32) -> bool {
        attempt < self.max_attempts && is_retryable_status(status)
    }

    pub fn should_retry_transport(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    time::OffsetDateTime::parse(value, &time::format_description::well_known::Rfc2822)
        .ok()
        .and_then(|at| {
            let delta = at - time::OffsetDateTime::now_utc();
            delta.is_positive().then(|| delta.unsigned_abs())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(5), Duration::from_secs(10));
        assert_eq!(policy.delay_after(40), Duration::from_secs(10));
    }

    #[test]
    fn retries_only_transient_statuses() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry_status(503, 1));
        assert!(policy.should_retry_status(429, 2));
        assert!(!policy.should_retry_status(503, 3));
        assert!(!policy.should_retry_status(404, 1));
        assert!(!policy.should_retry_status(409, 1));
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new(0).max_attempts, 1);
        assert!(!RetryPolicy::none().should_retry_transport(1));
    }

    #[test]
    fn retry_after_hint_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(
            policy.hinted_delay(1, parse_retry_after("120")),
            Duration::from_secs(10)
        );
        assert_eq!(policy.hinted_delay(2, None), Duration::from_secs(2));
    }
}
