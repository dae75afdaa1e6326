//! Resilience settings
//!
//! Retry settings as read from the config file, with sane defaults.

use serde::Deserialize;
use std::time::Duration;

use super::retry::RetryConfig;

/// Retry settings as they appear in the `[retry]` table of the config file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
            jitter: settings.jitter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let retry = RetryConfig::from(&RetrySettings::default());
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_millis(500));
        assert!(retry.jitter);
    }

    #[test]
    fn test_retry_settings_conversion() {
        let settings = RetrySettings {
            max_attempts: 0,
            base_delay_ms: 100,
            ..RetrySettings::default()
        };
        let retry = RetryConfig::from(&settings);

        // At least one attempt is always made
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.base_delay, Duration::from_millis(100));
        assert_eq!(retry.max_delay, Duration::from_millis(30000));
    }
}
