//! Import pipeline settings

use anyhow::{Result, bail};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_BATCH_SIZE: usize = 1000;

/// How budget lines are written to Dataverse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertStrategy {
    /// One request per line
    Single,
    /// `$batch` requests of `batch_size` lines
    #[default]
    Batched,
    /// Groups of batches submitted concurrently
    Parallel,
}

impl fmt::Display for UpsertStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UpsertStrategy::Single => "single",
            UpsertStrategy::Batched => "batched",
            UpsertStrategy::Parallel => "parallel",
        };
        f.write_str(name)
    }
}

impl FromStr for UpsertStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(UpsertStrategy::Single),
            "batched" | "batch" => Ok(UpsertStrategy::Batched),
            "parallel" | "parallel-batched" => Ok(UpsertStrategy::Parallel),
            other => bail!("Unknown upsert strategy '{}' (expected single, batched or parallel)", other),
        }
    }
}

/// The `[import]` table
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImportSettings {
    pub strategy: UpsertStrategy,
    pub batch_size: usize,
    /// Lines per concurrently submitted group in the parallel strategy
    pub parallel_group_size: usize,
    pub max_parallel_batches: usize,
    pub master_data_ttl_hours: u64,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            strategy: UpsertStrategy::Batched,
            batch_size: 50,
            parallel_group_size: 200,
            max_parallel_batches: 4,
            master_data_ttl_hours: 24,
        }
    }
}

impl ImportSettings {
    #[cfg(test)]
    pub fn builder() -> ImportSettingsBuilder {
        ImportSettingsBuilder::new()
    }

    pub fn master_data_ttl(&self) -> Duration {
        Duration::from_secs(self.master_data_ttl_hours * 3600)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&self.batch_size) {
            bail!(
                "batch_size must be between {} and {}, got {}",
                MIN_BATCH_SIZE,
                MAX_BATCH_SIZE,
                self.batch_size
            );
        }
        if self.parallel_group_size == 0 {
            bail!("parallel_group_size must be at least 1");
        }
        if self.max_parallel_batches == 0 {
            bail!("max_parallel_batches must be at least 1");
        }
        if self.master_data_ttl_hours == 0 {
            bail!("master_data_ttl_hours must be at least 1");
        }
        Ok(())
    }
}

/// Builder for ImportSettings, used to assemble test fixtures
#[cfg(test)]
#[derive(Debug)]
pub struct ImportSettingsBuilder {
    settings: ImportSettings,
}

#[cfg(test)]
impl ImportSettingsBuilder {
    pub fn new() -> Self {
        Self {
            settings: ImportSettings::default(),
        }
    }

    pub fn strategy(mut self, strategy: UpsertStrategy) -> Self {
        self.settings.strategy = strategy;
        self
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.settings.batch_size = batch_size;
        self
    }

    pub fn parallel_group_size(mut self, size: usize) -> Self {
        self.settings.parallel_group_size = size;
        self
    }

    pub fn max_parallel_batches(mut self, max: usize) -> Self {
        self.settings.max_parallel_batches = max;
        self
    }

    /// Build and validate
    pub fn build(self) -> Result<ImportSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = ImportSettings::default();
        assert_eq!(settings.strategy, UpsertStrategy::Batched);
        assert_eq!(settings.batch_size, 50);
        assert_eq!(settings.parallel_group_size, 200);
        assert_eq!(settings.max_parallel_batches, 4);
        assert_eq!(settings.master_data_ttl(), Duration::from_secs(24 * 3600));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_batch_size_bounds() {
        assert!(ImportSettings::builder().batch_size(0).build().is_err());
        assert!(ImportSettings::builder().batch_size(1001).build().is_err());
        assert!(ImportSettings::builder().batch_size(1).build().is_ok());
        assert!(ImportSettings::builder().batch_size(1000).build().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let settings = ImportSettings::builder()
            .strategy(UpsertStrategy::Parallel)
            .batch_size(10)
            .parallel_group_size(30)
            .max_parallel_batches(2)
            .build()
            .unwrap();
        assert_eq!(settings.strategy, UpsertStrategy::Parallel);
        assert_eq!(settings.batch_size, 10);
        assert_eq!(settings.parallel_group_size, 30);
        assert_eq!(settings.max_parallel_batches, 2);
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        assert!(ImportSettings::builder().max_parallel_batches(0).build().is_err());
        assert!(ImportSettings::builder().parallel_group_size(0).build().is_err());
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("single".parse::<UpsertStrategy>().unwrap(), UpsertStrategy::Single);
        assert_eq!("Batched".parse::<UpsertStrategy>().unwrap(), UpsertStrategy::Batched);
        assert_eq!("parallel".parse::<UpsertStrategy>().unwrap(), UpsertStrategy::Parallel);
        assert!("bulk".parse::<UpsertStrategy>().is_err());
        assert_eq!(UpsertStrategy::Parallel.to_string(), "parallel");
    }
}
