//! Replication classifier — a pure function from a queue/exchange
//! descriptor to a [`ReplicationLevel`].
//!
//! Consulted by every other component. Thread-safe because it's stateless
//! beyond the configured default.

use crate::types::{arg_keys, Descriptor, ReplicationLevel};
use crate::HaError;

/// Internal reserved name prefixes: replicator exchanges and management
/// queues are never replicated, regardless of configuration.
const RESERVED_PREFIXES: &[&str] = &["qpid.replicator-", "qmf.", "amq."];

/// Maps a queue/exchange descriptor to a [`ReplicationLevel`].
#[derive(Debug, Clone, Copy)]
pub struct ReplicationClassifier {
    default_level: ReplicationLevel,
}

impl ReplicationClassifier {
    pub fn new(default_level: ReplicationLevel) -> Self {
        Self { default_level }
    }

    /// Classifies a descriptor.
    ///
    /// Rules, applied in order:
    /// 1. Internal name (reserved prefix) → `none`.
    /// 2. Explicit `qpid.replicate` argument → parsed level, or a typed
    ///    error for an unknown spelling.
    /// 3. Otherwise, the configured default.
    pub fn classify(&self, descriptor: &Descriptor) -> Result<ReplicationLevel, HaError> {
        if is_internal_name(descriptor.name.as_str()) {
            return Ok(ReplicationLevel::None);
        }

        if let Some(value) = descriptor.args.get_str(arg_keys::REPLICATE) {
            return ReplicationLevel::parse(value).map_err(HaError::from);
        }

        Ok(self.default_level)
    }
}

fn is_internal_name(name: &str) -> bool {
    RESERVED_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}
