use std::{future::Future, time::Duration};

use rand::Rng;
use tracing::warn;

use crate::error::BackendError;

/// Delay bounds and jitter switch for one retry campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    min_delay_ms: u64,
    max_delay_ms: u64,
    jitter: bool,
}

impl BackoffPolicy {
    pub fn new(min_delay: Duration, max_delay: Duration, jitter: bool) -> Self {
        let min_delay_ms = min_delay.as_millis() as u64;
        let max_delay_ms = (max_delay.as_millis() as u64).max(min_delay_ms);
        Self {
            min_delay_ms,
            max_delay_ms,
            jitter,
        }
    }

    pub fn min_delay_ms(&self) -> u64 {
        self.min_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    pub fn jitter(&self) -> bool {
        self.jitter
    }

    /// Un-jittered delay for a zero-based attempt: `min * 2^attempt`, clamped.
    pub fn delay_for_attempt(&self, attempt: u32, retry_after_hint_ms: Option<u64>) -> Duration {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let calculated = self.min_delay_ms.saturating_mul(multiplier);
        let hinted = retry_after_hint_ms.unwrap_or(0);
        let bounded = calculated
            .max(hinted)
            .clamp(self.min_delay_ms, self.max_delay_ms);
        Duration::from_millis(bounded)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(5 * 60), true)
    }
}

/// Attempt counter over a [`BackoffPolicy`].
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    attempt: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    pub fn policy(&self) -> BackoffPolicy {
        self.policy
    }

    /// Number of delays handed out since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn next_delay(&mut self) -> Duration {
        self.next_delay_with_hint(None)
    }

    /// Like [`Backoff::next_delay`], never shorter than a server-provided hint.
    ///
    /// Jitter draws uniformly from `[min, computed]` and is skipped when a hint
    /// is present.
    pub fn next_delay_with_hint(&mut self, retry_after_hint_ms: Option<u64>) -> Duration {
        let computed = self
            .policy
            .delay_for_attempt(self.attempt, retry_after_hint_ms);
        self.attempt = self.attempt.saturating_add(1);

        if !self.policy.jitter || retry_after_hint_ms.is_some() {
            return computed;
        }

        let upper = computed.as_millis() as u64;
        let lower = self.policy.min_delay_ms.min(upper);
        Duration::from_millis(rand::thread_rng().gen_range(lower..=upper))
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

/// Upper bound on the number of attempts a retry loop makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryLimit {
    /// Keep trying until success or a permanent error.
    #[default]
    Unbounded,
    /// Give up after this many failed attempts.
    Attempts(u32),
}

impl RetryLimit {
    fn is_exhausted(&self, failed_attempts: u32) -> bool {
        match self {
            Self::Unbounded => false,
            Self::Attempts(limit) => failed_attempts >= *limit,
        }
    }
}

/// Which failures a retry loop treats as retryable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOn {
    /// Only [`BackendError::is_transient`] failures; anything else fails fast.
    TransientErrors,
    /// Every failure.
    AllErrors,
}

/// Backoff policy plus attempt limit for one kind of retry campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryConfig {
    pub policy: BackoffPolicy,
    pub limit: RetryLimit,
}

impl RetryConfig {
    pub fn new(policy: BackoffPolicy, limit: RetryLimit) -> Self {
        Self { policy, limit }
    }
}

/// Run `op` until it succeeds, sleeping between retryable failures.
///
/// The backoff is reset on success. A failure outside `retry_on` is returned
/// immediately without sleeping. Hitting a finite limit returns a
/// `retry_exhausted` error that keeps the category of the last failure.
pub async fn retry_with_backoff<T, F, Fut>(
    label: &str,
    backoff: &mut Backoff,
    limit: RetryLimit,
    retry_on: RetryOn,
    mut op: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut failed_attempts: u32 = 0;
    loop {
        let err = match op().await {
            Ok(value) => {
                backoff.reset();
                return Ok(value);
            }
            Err(err) => err,
        };

        if retry_on == RetryOn::TransientErrors && !err.is_transient() {
            return Err(err);
        }

        failed_attempts = failed_attempts.saturating_add(1);
        if limit.is_exhausted(failed_attempts) {
            return Err(BackendError::new(
                err.category,
                "retry_exhausted",
                format!(
                    "{label} failed after {failed_attempts} attempts: {}",
                    err.message
                ),
            ));
        }

        let delay = backoff.next_delay_with_hint(err.retry_after_ms);
        warn!(
            operation = label,
            attempt = failed_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "{label} failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}
