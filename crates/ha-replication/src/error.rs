//! Typed errors surfaced synchronously to a caller.
//!
//! Everything else that can go wrong on the wire — protocol errors on a
//! backup session, reconnection races, unknown disconnects, exceptions
//! inside a timer callback — is logged via `tracing` at the call site and
//! never reaches a `Result`, because the primary never retries a backup
//! internally and these conditions don't fail an in-flight caller's
//! operation.

use ha_types::ParseReplicationLevelError;
use thiserror::Error;

use crate::types::{BrokerUuid, QueueName};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HaError {
    /// `qpid.replicate` carried a spelling that isn't `none`/`configuration`/`all`.
    #[error("invalid replication level: {0}")]
    InvalidReplicationLevel(#[from] ParseReplicationLevelError),

    /// Queue settings that cannot be satisfied together (e.g. LVQ combined
    /// with priorities, fairshare without priorities).
    #[error("contradictory queue settings: {0}")]
    ContradictoryQueueSettings(String),

    /// A backup's per-queue catch-up budget would be exceeded by this
    /// `queueCreate`.
    #[error("backup {backup} would exceed its catch-up queue limit of {limit} (adding {queue})")]
    QueueLimitExceeded {
        backup: BrokerUuid,
        queue: QueueName,
        limit: usize,
    },
}
