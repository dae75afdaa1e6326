//! Production resilience features
//!
//! Provides retry policies and concurrency limiting for Dataverse API interactions.

pub mod concurrency;
pub mod config;
pub mod retry;

pub use concurrency::ConcurrencyLimiter;
pub use config::RetrySettings;
pub use retry::{RetryConfig, RetryPolicy, RetryableError};
