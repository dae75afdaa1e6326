//! Concurrency limiter implementation
//!
//! Provides a semaphore-based limiter for controlling how many batch requests
//! are in flight against Dataverse at the same time.

use anyhow::{Context, Result};
use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Semaphore-based concurrency limiter for controlling concurrent API requests
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent_requests: usize,
    requests_acquired: Arc<AtomicU64>,
    requests_waited: Arc<AtomicU64>,
}

impl ConcurrencyLimiter {
    /// Limiter allowing at most `max` concurrent permits (at least one)
    pub fn with_max(max: usize) -> Self {
        let max_concurrent_requests = max.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent_requests)),
            max_concurrent_requests,
            requests_acquired: Arc::new(AtomicU64::new(0)),
            requests_waited: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Acquire a permit for making a request. Waits if at capacity.
    /// Returns an owned permit that releases automatically when dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        if self.semaphore.available_permits() == 0 {
            self.requests_waited.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Concurrency limiter: waiting for permit ({} in use)",
                self.max_concurrent_requests
            );
        }

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Concurrency limiter semaphore was closed")?;
        self.requests_acquired.fetch_add(1, Ordering::Relaxed);

        Ok(permit)
    }

    /// Get the number of available permits (requests that can start immediately)
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get current statistics
    pub fn stats(&self) -> ConcurrencyStats {
        ConcurrencyStats {
            available_permits: self.available_permits(),
            max_concurrent_requests: self.max_concurrent_requests,
            requests_acquired: self.requests_acquired.load(Ordering::Relaxed),
            requests_waited: self.requests_waited.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for the concurrency limiter
#[derive(Debug, Clone)]
pub struct ConcurrencyStats {
    /// Number of permits currently available
    pub available_permits: usize,
    /// Maximum concurrent requests allowed
    pub max_concurrent_requests: usize,
    /// Total permits acquired since creation
    pub requests_acquired: u64,
    /// Number of times a request had to wait for a permit
    pub requests_waited: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrency_limiter_max_permits() {
        let limiter = ConcurrencyLimiter::with_max(3);

        let _p1 = limiter.acquire().await.unwrap();
        let _p2 = limiter.acquire().await.unwrap();
        let _p3 = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available_permits(), 0);

        // At capacity: a fourth acquire does not complete
        let fourth = tokio::time::timeout(Duration::from_millis(20), limiter.acquire()).await;
        assert!(fourth.is_err());
    }

    #[tokio::test]
    async fn test_concurrency_limiter_acquire_waits() {
        let limiter = ConcurrencyLimiter::with_max(1);
        let limiter_clone = limiter.clone();

        // Acquire the only permit
        let permit = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available_permits(), 0);

        // Spawn a task that will wait for a permit
        let handle = tokio::spawn(async move {
            let _permit = limiter_clone.acquire().await.unwrap();
            true
        });

        // Give the spawned task time to start waiting
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Release the permit
        drop(permit);

        // The waiting task should complete
        let result = tokio::time::timeout(Duration::from_millis(100), handle).await;

        assert!(result.is_ok());
        assert_eq!(limiter.stats().requests_waited, 1);
    }

    #[tokio::test]
    async fn test_concurrency_limiter_stats() {
        let limiter = ConcurrencyLimiter::with_max(3);

        let _p1 = limiter.acquire().await.unwrap();
        let _p2 = limiter.acquire().await.unwrap();

        let stats = limiter.stats();
        assert_eq!(stats.max_concurrent_requests, 3);
        assert_eq!(stats.available_permits, 1);
        assert_eq!(stats.requests_acquired, 2);
        assert_eq!(stats.requests_waited, 0);
    }

    #[tokio::test]
    async fn test_zero_max_still_allows_progress() {
        let limiter = ConcurrencyLimiter::with_max(0);
        assert_eq!(limiter.stats().max_concurrent_requests, 1);
        assert!(limiter.acquire().await.is_ok());
    }
}
