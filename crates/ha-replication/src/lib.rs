//! # ha-replication: primary-side HA replication core for an AMQP 0-10 broker
//!
//! Keeps a primary broker's queues and exchanges mirrored onto backup
//! brokers so a backup can be promoted without loss of acknowledged
//! messages or unacceptable duplication. Five collaborating pieces,
//! leaf-first:
//!
//! - [`classifier`] — pure queue/exchange → [`ReplicationLevel`] mapping.
//! - [`guard`] — per-(queue, backup) catch-up primitive.
//! - [`remote_backup`] — per-backup catch-up bookkeeping and readiness.
//! - [`primary`] — the process-wide primary role controller.
//! - [`replicator`] — the backup-side queue replicator.
//!
//! Everything this core needs from the surrounding broker kernel — the
//! queue/exchange registry, the membership publisher, the timer wheel, and
//! link/bridge establishment — is named as a trait in [`contracts`]; this
//! crate has no network or storage implementation of its own.

pub mod budget;
pub mod classifier;
pub mod contracts;
pub mod error;
pub mod guard;
pub mod primary;
pub mod remote_backup;
pub mod replicator;
pub mod settings;
pub mod types;

pub use error::HaError;
pub use primary::{PrimaryRole, SubscriptionHandle, TxObserver};
pub use remote_backup::{ConnectionHandle, RemoteBackup};
pub use replicator::{ControlEvent, QueueReplicator};
pub use types::{ArgValue, ArgumentBag, Descriptor};

pub use ha_types::{
    BrokerInfo, BrokerStatus, BrokerUuid, QueueName, ReplicationIdSet, ReplicationLevel,
    SequenceNumber,
};
