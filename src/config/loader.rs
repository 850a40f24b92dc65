//! Configuration loading and merging logic
//!
//! Handles loading configuration from multiple sources and merging them
//! according to precedence rules.

use super::{paths, schema::ControllerConfig};
use anyhow::{Context, Result};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with all layers merged
    ///
    /// Precedence order (highest to lowest):
    /// 1. Environment variable overrides
    /// 2. Config file (`path`, or the root config when it exists)
    /// 3. Built-in defaults
    ///
    /// An explicit `path` must exist; the root config is optional.
    pub fn load(path: Option<&Path>) -> Result<ControllerConfig> {
        let config = match path {
            Some(path) => Self::load_file(path)?,
            None => {
                let root = paths::root_config_path();
                if root.exists() {
                    Self::load_file(&root)?
                } else {
                    tracing::debug!("no config file at {}, using defaults", root.display());
                    ControllerConfig::default()
                }
            }
        };

        let config = Self::apply_env_overrides(config)?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_file(path: &Path) -> Result<ControllerConfig> {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: ControllerConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject settings the controller cannot run with
    pub fn validate(config: &ControllerConfig) -> Result<()> {
        if config.queue_capacity == 0 {
            return Err(anyhow::anyhow!("queueCapacity must be at least 1"));
        }
        let kind = &config.application_kind;
        if kind.kind.is_empty() || kind.gvr.resource.is_empty() || kind.gvr.version.is_empty() {
            return Err(anyhow::anyhow!(
                "applicationKind needs kind, version and resource"
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(config: ControllerConfig) -> Result<ControllerConfig> {
        Self::apply_overrides(config, |name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(mut config: ControllerConfig, var: F) -> Result<ControllerConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        // APPNAV_NAMESPACES: comma separated, empty means all
        if let Some(namespaces) = var("APPNAV_NAMESPACES") {
            config.namespaces = namespaces
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Some(duration) = var("APPNAV_BATCH_DURATION_MS") {
            config.batch_duration_ms = duration
                .parse()
                .context("APPNAV_BATCH_DURATION_MS must be a number")?;
        }

        if let Some(capacity) = var("APPNAV_QUEUE_CAPACITY") {
            config.queue_capacity = capacity
                .parse()
                .context("APPNAV_QUEUE_CAPACITY must be a number")?;
        }

        Ok(config)
    }
}
