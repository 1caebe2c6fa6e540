//! Queue guard — per-(queue, backup) catch-up primitive.
//!
//! A guard intercepts outbound messages on a queue being caught up so a
//! late-joining backup can later learn exactly which messages it missed.
//! Guards rely on queue-internal locking; they acquire no additional mutex
//! of their own beyond the `Mutex` guarding their own pending-id set.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::types::SequenceNumber;

/// Monotonic per-queue replication-id counter, shared by every guard
/// attached to the same queue.
#[derive(Debug, Clone, Default)]
pub struct QueueCounter(Arc<AtomicU64>);

impl QueueCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws the next replication id for a freshly enqueued message.
    pub fn next(&self) -> SequenceNumber {
        SequenceNumber::new(self.0.fetch_add(1, Ordering::SeqCst))
    }
}

/// Per-(queue, backup) catch-up guard.
#[derive(Debug)]
pub struct QueueGuard {
    counter: QueueCounter,
    attached: AtomicBool,
    pending: Mutex<HashSet<SequenceNumber>>,
}

impl QueueGuard {
    /// Installs a guard on a queue, synchronously, before any client can
    /// enqueue.
    pub fn attach(counter: QueueCounter) -> Self {
        Self {
            counter,
            attached: AtomicBool::new(true),
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// True while the guard is installed; `cancel` flips this false.
    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    /// Tags a freshly enqueued message with a replication id and records it
    /// as pending completion by this backup.
    pub fn tag_enqueue(&self) -> SequenceNumber {
        let id = self.counter.next();
        self.pending.lock().expect("guard mutex poisoned").insert(id);
        id
    }

    /// Records that `id` was already assigned (by a sibling guard on the
    /// same queue) and is also pending completion on this backup.
    pub fn track(&self, id: SequenceNumber) {
        self.pending.lock().expect("guard mutex poisoned").insert(id);
    }

    /// Called when this backup has acknowledged replication of `id`.
    pub fn complete(&self, id: SequenceNumber) {
        self.pending.lock().expect("guard mutex poisoned").remove(&id);
    }

    /// True iff this guard still considers `id` in flight — i.e. the
    /// message is not yet safe to regard as "completed to clients" on this
    /// backup's account.
    pub fn is_pending(&self, id: SequenceNumber) -> bool {
        self.pending.lock().expect("guard mutex poisoned").contains(&id)
    }

    /// Detaches the guard; the queue reverts to unguarded operation.
    pub fn cancel(&self) {
        self.attached.store(false, Ordering::SeqCst);
        self.pending.lock().expect("guard mutex poisoned").clear();
    }
}
