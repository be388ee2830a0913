//! Retry Logic for Transient Storage Errors
//!
//! Bounded retry with exponential backoff and jitter for operations that
//! fail with [`GateError::TransientStorage`]. Client denials (invalid
//! licence, quota exceeded, rate limit, not found) are terminal and are
//! never retried, so a caller can never mistake a storage fault for being
//! out of quota.

use std::time::Duration;
use tokio::time::sleep;

use crate::error::GateError;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: usize,

    /// Base delay before the first retry
    pub base_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Jitter factor (0.0 to 1.0) to avoid synchronized retries
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    /// Set the maximum number of attempts
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the base delay between retries
    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay between retries
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the jitter factor, clamped to [0.0, 1.0]
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Calculate the delay for a given attempt
    ///
    /// Exponential backoff (base * 2^attempt) with jitter, capped at
    /// `max_delay`.
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let exponential = self.base_delay * 2_u32.pow(attempt.min(16) as u32);
        let jitter_range = exponential.mul_f64(self.jitter);
        let jitter_offset = (rand::random::<f64>() - 0.5) * 2.0 * jitter_range.as_secs_f64();
        let jittered = exponential.saturating_add(Duration::from_secs_f64(jitter_offset.abs()));
        jittered.min(self.max_delay)
    }
}

/// Retry an operation while it fails with a transient storage error
///
/// Any other error (client denial, generation failure) is returned
/// immediately. If all attempts fail, the last transient error surfaces
/// as-is so the server layer can report a distinct server fault.
pub async fn retry_transient<F, T, Fut>(config: &RetryConfig, mut operation: F) -> Result<T, GateError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, GateError>>,
{
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!("Operation succeeded on attempt {}", attempt + 1);
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts - 1 => {
                let delay = config.calculate_delay(attempt);
                tracing::warn!("Attempt {} failed transiently: {}, retrying in {:?}", attempt + 1, e, delay);
                sleep(delay).await;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| GateError::TransientStorage("retry budget exhausted".to_string())))
}
