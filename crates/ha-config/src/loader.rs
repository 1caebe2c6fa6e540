//! Layered configuration loading: defaults → project file → environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ha_types::ReplicationLevel;

use crate::error::ConfigError;
use crate::HaConfig;

/// Loads [`HaConfig`] from a project directory, following the same
/// precedence order as the broker's own configuration layer:
///
/// 1. Environment variables (`HA_*`)
/// 2. `ha.toml` in the project directory (if present)
/// 3. Built-in defaults
pub struct ConfigLoader {
    project_dir: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { project_dir: None }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn load(&self) -> Result<HaConfig, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(dir) = &self.project_dir {
            let path = dir.join("ha.toml");
            builder = builder.add_source(config::File::from(path).required(false));
        }

        // `RawConfig` is flat — unlike the teacher's nested
        // `KimberliteConfig`, there is no section structure for a "_"
        // separator to split env-var keys into, and multi-word keys like
        // `backup_timeout_secs` would otherwise be chopped into spurious
        // nested paths. So env vars are matched as single flat keys
        // (`HA_BACKUP_TIMEOUT_SECS` -> `backup_timeout_secs`) instead.
        builder = builder.add_source(config::Environment::with_prefix("HA").try_parsing(true));

        let built = builder.build()?;
        let raw: RawConfig = built.try_deserialize()?;

        let mut cfg = HaConfig::default();
        raw.apply(&mut cfg)?;
        Ok(cfg)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, serde::Deserialize)]
struct RawConfig {
    replicate_default: Option<String>,
    backup_timeout_secs: Option<u64>,
    max_catchup_queues: Option<usize>,
}

impl RawConfig {
    fn apply(&self, cfg: &mut HaConfig) -> Result<(), ConfigError> {
        if let Some(level) = &self.replicate_default {
            cfg.replicate_default =
                ReplicationLevel::parse(level).map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        }
        if let Some(secs) = self.backup_timeout_secs {
            cfg.backup_timeout = Duration::from_secs(secs);
        }
        if let Some(limit) = self.max_catchup_queues {
            cfg.max_catchup_queues = limit;
        }
        Ok(())
    }
}
