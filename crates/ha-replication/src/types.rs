//! Re-exports of the shared data model, plus the broker-observer argument
//! and descriptor types the classifier and primary role controller consume.

use std::collections::HashMap;

pub use ha_types::{
    BrokerInfo, BrokerStatus, BrokerUuid, QueueName, ReplicationIdSet, ReplicationLevel,
    SequenceNumber,
};

/// Reserved queue/exchange argument table keys, matching the wire spellings
/// exactly.
pub mod arg_keys {
    pub const REPLICATE: &str = "qpid.replicate";
    pub const HA_UUID: &str = "qpid.ha-uuid";
    pub const REPLICATING_SUBSCRIPTION: &str = "qpid.replicating-subscription";
    pub const SYNC_FREQUENCY: &str = "qpid.sync_frequency";

    /// Canonical spellings the out-of-scope queue-settings parser is
    /// required to translate legacy `x-qpid-*` arguments into before this
    /// core ever inspects them (spec.md §6). This crate validates these
    /// keys; it does not perform the `x-qpid-*` translation itself.
    pub const LAST_VALUE_QUEUE: &str = "qpid.last_value_queue";
    pub const PRIORITIES: &str = "qpid.priorities";
    pub const FAIRSHARE: &str = "qpid.fairshare";
}

/// Routing keys on a replicator exchange's control stream (spec.md §4.5, §6).
pub mod routing_keys {
    pub const DEQUEUE_EVENT: &str = "qpid.dequeue-event";
    pub const POSITION_EVENT: &str = "qpid.position-event";
}

/// A single value in a queue/exchange argument table.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Uuid(uuid::Uuid),
}

/// The argument bag carried by a queue or exchange declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentBag(HashMap<String, ArgValue>);

impl ArgumentBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: ArgValue) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.0.get(key) {
            Some(ArgValue::Str(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.0.get(key) {
            Some(ArgValue::Int(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key) {
            Some(ArgValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: ArgValue) {
        self.0.insert(key.into(), value);
    }
}

/// A queue or exchange as presented to the classifier and the primary role
/// controller by the (out-of-scope) broker registry.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub name: QueueName,
    pub args: ArgumentBag,
}

impl Descriptor {
    pub fn new(name: impl Into<QueueName>, args: ArgumentBag) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}
