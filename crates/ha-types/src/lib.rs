//! # ha-types: shared data model for the HA replication core
//!
//! This crate holds the vocabulary shared by every other crate in the
//! workspace:
//! - Broker identity ([`BrokerUuid`], [`BrokerInfo`], [`BrokerStatus`])
//! - Replication scope ([`ReplicationLevel`])
//! - Per-message sequencing ([`SequenceNumber`], [`ReplicationIdSet`])
//! - Queue/exchange naming ([`QueueName`])

use std::collections::BTreeSet;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// BrokerUuid
// ============================================================================

/// 128-bit system identity of a broker in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BrokerUuid(Uuid);

impl BrokerUuid {
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Display for BrokerUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for BrokerUuid {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<BrokerUuid> for Uuid {
    fn from(value: BrokerUuid) -> Self {
        value.0
    }
}

// ============================================================================
// BrokerStatus
// ============================================================================

/// Membership status of a broker as published to the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrokerStatus {
    Joining,
    Catchup,
    Ready,
    Recovering,
    Active,
    Standalone,
}

impl Display for BrokerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Joining => "joining",
            Self::Catchup => "catchup",
            Self::Ready => "ready",
            Self::Recovering => "recovering",
            Self::Active => "active",
            Self::Standalone => "standalone",
        };
        write!(f, "{s}")
    }
}

// ============================================================================
// BrokerInfo
// ============================================================================

/// Identity of a broker in the cluster.
///
/// Two `BrokerInfo`s are equal iff their [`BrokerUuid`]s match — the name,
/// address, and status are descriptive, not identifying.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerInfo {
    pub system_id: BrokerUuid,
    pub name: String,
    pub address: String,
    pub status: BrokerStatus,
}

impl BrokerInfo {
    pub fn new(system_id: BrokerUuid, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            system_id,
            name: name.into(),
            address: address.into(),
            status: BrokerStatus::Joining,
        }
    }
}

impl PartialEq for BrokerInfo {
    fn eq(&self, other: &Self) -> bool {
        self.system_id == other.system_id
    }
}

impl Eq for BrokerInfo {}

// ============================================================================
// ReplicationLevel
// ============================================================================

/// How much of a queue or exchange is mirrored to backups.
///
/// Forms a total order: `None < Configuration < All`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationLevel {
    /// Nothing is replicated.
    None,
    /// Existence of the queue/exchange is replicated, but not messages.
    Configuration,
    /// Existence and messages are both replicated.
    All,
}

impl ReplicationLevel {
    /// Parses the `qpid.replicate` argument value.
    ///
    /// # Errors
    ///
    /// Returns [`ParseReplicationLevelError`] for any spelling other than
    /// `none`, `configuration`, or `all` (case-sensitive, per spec).
    pub fn parse(value: &str) -> Result<Self, ParseReplicationLevelError> {
        match value {
            "none" => Ok(Self::None),
            "configuration" => Ok(Self::Configuration),
            "all" => Ok(Self::All),
            other => Err(ParseReplicationLevelError(other.to_string())),
        }
    }
}

impl Display for ReplicationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Configuration => "configuration",
            Self::All => "all",
        };
        write!(f, "{s}")
    }
}

/// Unknown spelling of a `qpid.replicate` argument value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown replication level spelling: {0:?}")]
pub struct ParseReplicationLevelError(pub String);

// ============================================================================
// SequenceNumber / Position
// ============================================================================

/// A monotonic per-queue 64-bit counter naming an enqueued message, or a
/// backup mirror's replay position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub const ZERO: Self = Self(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SequenceNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================================================
// ReplicationIdSet
// ============================================================================

/// A set of [`SequenceNumber`]s identifying individual messages on a
/// replicated queue.
///
/// Backed by a `BTreeSet` so range containment and ordered iteration are
/// cheap; membership and union are the operations the dequeue-event and
/// catch-up paths need most.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplicationIdSet {
    ids: BTreeSet<SequenceNumber>,
}

impl ReplicationIdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: SequenceNumber) -> bool {
        self.ids.insert(id)
    }

    pub fn remove(&mut self, id: SequenceNumber) -> bool {
        self.ids.remove(&id)
    }

    pub fn contains(&self, id: SequenceNumber) -> bool {
        self.ids.contains(&id)
    }

    /// True iff every id in `[lo, hi)` is present in the set.
    pub fn contains_range(&self, lo: SequenceNumber, hi: SequenceNumber) -> bool {
        if lo >= hi {
            return true;
        }
        self.ids.range(lo..hi).count() == (hi.as_u64() - lo.as_u64()) as usize
    }

    /// Merges `other` into `self` in place.
    pub fn union_with(&mut self, other: &Self) {
        self.ids.extend(other.ids.iter().copied());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SequenceNumber> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<SequenceNumber> for ReplicationIdSet {
    fn from_iter<T: IntoIterator<Item = SequenceNumber>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// QueueName
// ============================================================================

/// Name of a queue or exchange. Newtype rather than a bare `String` so the
/// replicator-exchange naming convention (`qpid.replicator-<name>`) and the
/// internal-pattern checks in the classifier can't be confused with
/// arbitrary strings at call sites.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the replicator exchange a backup hosts for this source queue.
    pub fn replicator_exchange_name(&self) -> String {
        format!("qpid.replicator-{}", self.0)
    }
}

impl Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for QueueName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for QueueName {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replication_level_orders_none_lt_configuration_lt_all() {
        assert!(ReplicationLevel::None < ReplicationLevel::Configuration);
        assert!(ReplicationLevel::Configuration < ReplicationLevel::All);
    }

    #[test]
    fn replication_level_parse_rejects_unknown_spelling() {
        assert_eq!(ReplicationLevel::parse("all"), Ok(ReplicationLevel::All));
        assert!(ReplicationLevel::parse("ALL").is_err());
        assert!(ReplicationLevel::parse("messages").is_err());
    }

    #[test]
    fn broker_info_equality_is_by_uuid_only() {
        let id = BrokerUuid::new(Uuid::nil());
        let mut a = BrokerInfo::new(id, "b1", "10.0.0.1:5672");
        let b = BrokerInfo::new(id, "b1-renamed", "10.0.0.2:5672");
        a.status = BrokerStatus::Active;
        assert_eq!(a, b);
    }

    #[test]
    fn replication_id_set_contains_range() {
        let set: ReplicationIdSet = [1u64, 2, 3, 5]
            .into_iter()
            .map(SequenceNumber::new)
            .collect();
        assert!(set.contains_range(SequenceNumber::new(1), SequenceNumber::new(4)));
        assert!(!set.contains_range(SequenceNumber::new(1), SequenceNumber::new(6)));
        assert!(set.contains_range(SequenceNumber::new(10), SequenceNumber::new(10)));
    }

    #[test]
    fn replication_id_set_union() {
        let mut a: ReplicationIdSet = [1u64, 2].into_iter().map(SequenceNumber::new).collect();
        let b: ReplicationIdSet = [2u64, 3].into_iter().map(SequenceNumber::new).collect();
        a.union_with(&b);
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn queue_name_replicator_exchange_naming() {
        let q = QueueName::new("orders");
        assert_eq!(q.replicator_exchange_name(), "qpid.replicator-orders");
    }
}
