//! Remote backup — per-backup catch-up bookkeeping.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::budget::QueueLimitBudget;
use crate::guard::{QueueCounter, QueueGuard};
use crate::types::{BrokerInfo, QueueName};

/// Opaque identity of an inbound TCP session to a backup.
///
/// A reconnection replaces the handle atomically by simply storing a new
/// one; there is no "half reconnected" state to model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub u64);

/// Mutable per-backup record.
///
/// Always accessed under the owning primary role controller's lock; a
/// `RemoteBackup` carries no lock of its own.
#[derive(Debug)]
pub struct RemoteBackup {
    pub info: BrokerInfo,
    pub connection: Option<ConnectionHandle>,
    pub expected: bool,
    catchup_queues: HashMap<QueueName, QueueGuard>,
    ready_queues: HashSet<QueueName>,
    was_ready: bool,
    pub budget: QueueLimitBudget,
}

impl RemoteBackup {
    pub fn new(info: BrokerInfo, expected: bool, queue_limit: usize) -> Self {
        Self {
            info,
            connection: None,
            expected,
            catchup_queues: HashMap::new(),
            ready_queues: HashSet::new(),
            was_ready: false,
            budget: QueueLimitBudget::new(queue_limit),
        }
    }

    pub fn catchup_queues(&self) -> impl Iterator<Item = &QueueName> {
        self.catchup_queues.keys()
    }

    pub fn ready_queues(&self) -> &HashSet<QueueName> {
        &self.ready_queues
    }

    pub fn guard(&self, queue: &QueueName) -> Option<&QueueGuard> {
        self.catchup_queues.get(queue)
    }

    pub fn is_catching_up(&self, queue: &QueueName) -> bool {
        self.catchup_queues.contains_key(queue)
    }

    /// Primary has just created queue `q`; admit it into catch-up with a
    /// fresh guard attached.
    ///
    /// Returns `Err(())` if the per-backup queue-limit budget has no room;
    /// the caller must not admit the queue.
    pub fn queue_create(&mut self, queue: QueueName, counter: QueueCounter) -> Result<(), ()> {
        if !self.budget.acquire() {
            return Err(());
        }
        self.catchup_queues.insert(queue, QueueGuard::attach(counter));
        self.was_ready = false;
        Ok(())
    }

    /// Enumerates a pre-existing queue onto this backup at promotion or
    /// connection time.
    ///
    /// A queue the backup already knows about (e.g. a reconnecting
    /// expected backup revisiting queues whose guards were created at
    /// promotion time) is idempotent and leaves the existing guard
    /// untouched. `create_guard` is accepted to mirror the spec's
    /// enumeration contract (promotion-time enumeration passes `true`,
    /// connection-time re-enumeration passes `false`), but a guard must
    /// exist before client traffic can reach any catch-up queue
    /// regardless of caller, so both cases install one here.
    pub fn catchup_queue(&mut self, queue: QueueName, counter: QueueCounter, _create_guard: bool) -> Result<(), ()> {
        if self.catchup_queues.contains_key(&queue) || self.ready_queues.contains(&queue) {
            return Ok(());
        }
        if !self.budget.acquire() {
            return Err(());
        }
        self.catchup_queues.insert(queue, QueueGuard::attach(counter));
        self.was_ready = false;
        Ok(())
    }

    /// Signals that enumeration is complete; queues absent from
    /// `catchup_queues`/`ready_queues` will not appear later except via a
    /// fresh `queue_create`. No bookkeeping is required beyond the
    /// contract this documents: callers must not call `catchup_queue`
    /// again for queues that existed before this point.
    pub fn start_catchup(&mut self) {}

    /// Removes `q` from both `catchup_queues` and `ready_queues`.
    pub fn queue_destroy(&mut self, queue: &QueueName) {
        if self.catchup_queues.remove(queue).is_some() {
            self.budget.release(1);
        }
        self.ready_queues.remove(queue);
    }

    /// A replicating subscription for `q` reports it has caught up;
    /// moves `q` from catch-up to ready.
    pub fn ready(&mut self, queue: &QueueName) {
        if let Some(guard) = self.catchup_queues.remove(queue) {
            guard.cancel();
            self.budget.release(1);
            self.ready_queues.insert(queue.clone());
        } else {
            debug!(queue = %queue, "ready() called for a queue not in catch-up; ignoring");
        }
    }

    /// Edge-triggered: true iff `catchup_queues` is empty and every queue
    /// in `all_replicated_queues` is in `ready_queues`, AND this is the
    /// first time that condition has held since the last time it didn't.
    pub fn report_ready(&mut self, all_replicated_queues: &HashSet<QueueName>) -> bool {
        let ready_now = self.catchup_queues.is_empty()
            && all_replicated_queues.iter().all(|q| self.ready_queues.contains(q));
        let edge = ready_now && !self.was_ready;
        self.was_ready = ready_now;
        edge
    }

    /// Tears down all guards.
    pub fn cancel(&mut self) {
        for (_, guard) in self.catchup_queues.drain() {
            guard.cancel();
        }
        self.budget.release(usize::MAX);
        self.ready_queues.clear();
        self.was_ready = false;
    }
}
