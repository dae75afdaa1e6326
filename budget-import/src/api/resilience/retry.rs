//! Retry policy with exponential backoff

use log::warn;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Randomize each delay between 50% and 100% of its computed value
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Errors worth retrying: throttling, transient server errors and transport failures
#[derive(Debug, Clone, PartialEq)]
pub enum RetryableError {
    /// HTTP 429, optionally with the server's Retry-After
    Throttled { retry_after: Option<Duration> },
    /// HTTP 5xx
    Server { status: u16, message: String },
    /// Connection reset, timeout, DNS failure...
    Transport(String),
}

impl std::fmt::Display for RetryableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryableError::Throttled { .. } => write!(f, "Request throttled by Dataverse (HTTP 429)"),
            RetryableError::Server { status, message } => {
                write!(f, "Dataverse server error (HTTP {}): {}", status, message)
            }
            RetryableError::Transport(message) => write!(f, "Transport error: {}", message),
        }
    }
}

impl std::error::Error for RetryableError {}

/// Executes operations, retrying those that fail with a `RetryableError`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before retry number `attempt` (1 = first retry), without jitter
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = self
            .config
            .backoff_multiplier
            .powi(attempt.saturating_sub(1) as i32);
        let delay = self.config.base_delay.mul_f64(factor.max(0.0));
        delay.min(self.config.max_delay)
    }

    fn delay_for(&self, attempt: u32, error: &RetryableError) -> Duration {
        if let RetryableError::Throttled {
            retry_after: Some(retry_after),
        } = error
        {
            return (*retry_after).min(self.config.max_delay);
        }

        let delay = self.backoff_delay(attempt);
        if self.config.jitter {
            delay.mul_f64(rand::rng().random_range(0.5..=1.0))
        } else {
            delay
        }
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error, or attempts run out
    pub async fn execute<T, F, Fut>(&self, description: &str, mut operation: F) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let retryable = err.downcast_ref::<RetryableError>().cloned();
                    match retryable {
                        Some(retryable) if attempt < self.config.max_attempts => {
                            let delay = self.delay_for(attempt, &retryable);
                            warn!(
                                "{} failed (attempt {}/{}): {}; retrying in {:?}",
                                description, attempt, self.config.max_attempts, retryable, delay
                            );
                            tokio::time::sleep(delay).await;
                            attempt += 1;
                        }
                        _ => return Err(err),
                    }
                }
            }
        }
    }
}
