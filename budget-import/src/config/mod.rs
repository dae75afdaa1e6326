//! Configuration loading
//!
//! Settings come from a TOML file (`--config`, or `budget-import/config.toml`
//! under the user config directory). Connection settings can be overridden by
//! `DATAVERSE_*` environment variables, which `main` also loads from `.env`.

pub mod import;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::api::auth::Credentials;
use crate::api::resilience::{RetryConfig, RetrySettings};

pub use import::{ImportSettings, UpsertStrategy};

pub const ENV_URL: &str = "DATAVERSE_URL";
pub const ENV_TENANT_ID: &str = "DATAVERSE_TENANT_ID";
pub const ENV_CLIENT_ID: &str = "DATAVERSE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "DATAVERSE_CLIENT_SECRET";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub dataverse: DataverseConfig,
    pub import: ImportSettings,
    pub retry: RetrySettings,
}

/// The `[dataverse]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataverseConfig {
    pub url: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub api_version: String,
}

impl Default for DataverseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            api_version: "v9.2".to_string(),
        }
    }
}

impl DataverseConfig {
    /// Fail with the names of any missing connection settings
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("url", &self.url),
            ("tenant_id", &self.tenant_id),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ]
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();

        if !missing.is_empty() {
            bail!(
                "Missing Dataverse connection settings: {} (set them in [dataverse] or via {}, {}, {}, {})",
                missing.join(", "),
                ENV_URL,
                ENV_TENANT_ID,
                ENV_CLIENT_ID,
                ENV_CLIENT_SECRET
            );
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            tenant_id: self.tenant_id.clone(),
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }
}

/// Default config file location (~/.config/budget-import/config.toml on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("budget-import").join("config.toml"))
}

impl Config {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid configuration file")
    }

    /// Load from an explicit path, else the default location if it exists, else defaults.
    /// Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path().filter(|p| p.exists()),
        };

        let mut config = match path {
            Some(path) => {
                log::debug!("Loading configuration from {}", path.display());
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml(&content)?
            }
            None => {
                log::debug!("No configuration file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.import.validate()?;
        Ok(config)
    }

    /// Override connection settings from the environment (non-empty values only)
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let overrides = [
            (ENV_URL, &mut self.dataverse.url),
            (ENV_TENANT_ID, &mut self.dataverse.tenant_id),
            (ENV_CLIENT_ID, &mut self.dataverse.client_id),
            (ENV_CLIENT_SECRET, &mut self.dataverse.client_secret),
        ];
        for (key, target) in overrides {
            if let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *target = value;
            }
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }
}
