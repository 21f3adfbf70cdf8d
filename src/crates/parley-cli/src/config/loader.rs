//! Configuration loading
//!
//! Priority order (later wins):
//! 1. Default values
//! 2. `parley.toml` (explicit `--config` path, else the working directory)
//! 3. `PARLEY_*` environment variables

use crate::config::schema::ParleyConfig;
use crate::error::{CliError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "parley.toml";

/// Resolves and reads the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Look for `parley.toml` in the working directory; absent means defaults.
    pub fn new() -> Self {
        Self { path: None }
    }

    /// Read exactly this file; absent is an error.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub async fn load(&self) -> Result<ParleyConfig> {
        let mut config = match &self.path {
            Some(path) => Self::load_from_path(path).await?,
            None => {
                let path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    Self::load_from_path(&path).await?
                } else {
                    debug!("no {} in working directory, using defaults", DEFAULT_CONFIG_FILE);
                    ParleyConfig::default()
                }
            }
        };

        config.apply_env_overrides()?;
        config.validate()?;

        info!(
            database = %config.database.path.display(),
            provider = %config.llm.provider,
            model = config.llm.model_name(),
            tool_servers = config.tools.servers.len(),
            "configuration loaded"
        );
        Ok(config)
    }

    async fn load_from_path(path: &Path) -> Result<ParleyConfig> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CliError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config = ParleyConfig::from_toml_str(&content)?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
