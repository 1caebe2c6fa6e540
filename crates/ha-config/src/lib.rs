//! Configuration recognised by the HA replication core.
//!
//! The core itself has no CLI and no persisted state; it is embedded in a
//! broker process. This crate loads the keys the core consults:
//! `replicateDefault`, `backupTimeout`, and the per-backup catch-up queue
//! limit.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use std::time::Duration;

use ha_types::ReplicationLevel;

/// Configuration recognised by the HA replication core.
#[derive(Debug, Clone, PartialEq)]
pub struct HaConfig {
    /// Replication level applied to queues/exchanges with no explicit
    /// `qpid.replicate` argument.
    pub replicate_default: ReplicationLevel,

    /// How long the primary waits for an expected backup to connect before
    /// downgrading it out of `expectedBackups`.
    pub backup_timeout: Duration,

    /// Per-backup ceiling on queues simultaneously in catch-up.
    pub max_catchup_queues: usize,
}

impl Default for HaConfig {
    fn default() -> Self {
        Self {
            replicate_default: ReplicationLevel::None,
            backup_timeout: Duration::from_secs(60),
            max_catchup_queues: 10_000,
        }
    }
}

impl HaConfig {
    pub fn load_from_dir(project_dir: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_replicates_nothing_by_default() {
        let cfg = HaConfig::default();
        assert_eq!(cfg.replicate_default, ReplicationLevel::None);
        assert_eq!(cfg.backup_timeout, Duration::from_secs(60));
    }
}
