//! Seams to the surrounding broker kernel.
//!
//! Everything in this module is implemented by the embedder in production
//! and by in-memory fakes in tests. The replication core never reaches
//! into queue storage, the membership protocol, or the timer wheel
//! directly — it only calls through these traits.

use std::time::Duration;

use bytes::Bytes;

use crate::remote_backup::ConnectionHandle;
use crate::types::{BrokerInfo, QueueName, SequenceNumber};

/// The set of mirror-queue operations the primary role controller and the
/// backup-side replicator need from the broker's queue/exchange registry.
pub trait QueueRegistry: Send + Sync {
    /// Lists every currently declared queue eligible for replication
    /// (already filtered by the classifier).
    fn replicated_queues(&self) -> Vec<QueueName>;

    /// Clears the auto-delete flag on every replicator exchange left over
    /// from a previous backup role, so they survive the promotion to
    /// primary instead of being torn down mid-transition.
    fn promote_leftover_replicators(&self);

    /// Purges a backup's local mirror of `queue`, then resets its replay
    /// position to empty. Used when a replicating subscription is
    /// (re)established so stale mirror content never leaks into a fresh
    /// catch-up.
    fn reset_mirror(&self, queue: &QueueName);

    /// Removes a single message from the mirror by replication id, used to
    /// apply a `qpid.dequeue-event`. A no-op if the id is not present —
    /// this is what makes dequeue processing idempotent.
    fn dequeue(&self, queue: &QueueName, id: SequenceNumber);

    /// The mirror queue's current replay position. Backup-side only;
    /// queried and advanced exclusively under the owning
    /// [`crate::replicator::QueueReplicator`]'s mutex.
    fn position(&self, queue: &QueueName) -> SequenceNumber;

    /// Sets the mirror queue's replay position directly, bypassing the
    /// per-message increment `enqueue` performs. Used to apply a
    /// `qpid.position-event` jump.
    fn set_position(&self, queue: &QueueName, position: SequenceNumber);

    /// Delivers a message body onto the mirror queue, assigning it the
    /// queue's current position and advancing the position by one.
    /// Returns the id assigned to `body`.
    fn enqueue(&self, queue: &QueueName, body: Bytes) -> SequenceNumber;
}

/// Publishes membership status changes to the rest of the cluster.
pub trait MembershipPublisher: Send + Sync {
    fn set_status(&self, broker: &BrokerInfo);
    fn add(&self, broker: &BrokerInfo);
    fn remove(&self, broker: &BrokerInfo);
}

/// A single scheduled timer task, cancellable independently of others on
/// the same service.
pub trait TimerTask: Send {
    fn cancel(&self);
}

/// Schedules delayed callbacks. The primary role controller uses exactly
/// one live timer per expected-but-not-yet-connected backup.
///
/// Implementers must run `callback` under a `catch_unwind` (or equivalent):
/// an exception inside a timer callback is caught and logged by the timer
/// thread, which must never die (spec.md §7).
pub trait TimerService: Send + Sync {
    fn add(&self, delay: Duration, callback: Box<dyn FnOnce() + Send>) -> Box<dyn TimerTask>;
}

/// Link/bridge establishment to the primary, consumed by the backup-side
/// [`crate::replicator::QueueReplicator`]. Out of scope per spec.md §1 —
/// this trait is the named contract only; AMQP bridge handshaking and
/// credit-based flow control are implemented by the embedder.
pub trait ReplicationLink: Send + Sync {
    /// Declares a non-durable, non-dynamic bridge from `source_queue` on
    /// the primary to `destination_exchange` (this backup's replicator
    /// exchange). `on_ready` fires once the bridge handshake completes.
    fn declare_bridge(
        &self,
        source_queue: &QueueName,
        destination_exchange: &str,
        on_ready: Box<dyn FnOnce() + Send>,
    );

    /// Subscribes to `source_queue` with `qpid.replicating-subscription=1`
    /// and a sync frequency of 1, issuing enough credit to stream without
    /// blocking.
    fn subscribe_replicating(&self, source_queue: &QueueName);
}

/// Re-exported so callers of this module don't need to reach into
/// `remote_backup` directly for the connection-identity type.
pub type Connection = ConnectionHandle;

/// In-memory fakes for the traits above, used by component tests inline
/// in this crate and by the seed-scenario integration tests in `tests/`.
/// Gated behind `test-util` (rather than bare `cfg(test)`) so the
/// integration-test binary, which compiles this crate as an ordinary
/// dependency rather than under its own `cfg(test)`, can reach them too —
/// the same shape `kimberlite-sim` uses its crates' `sim` feature for.
#[cfg(any(test, feature = "test-util"))]
pub mod fakes {

    use std::sync::Mutex;

    use super::*;

    use std::collections::HashMap;

    /// Per-queue mirror state: the real bookkeeping a storage engine would
    /// own, reduced to what the replication core's tests need to observe.
    #[derive(Default)]
    struct MirrorState {
        position: SequenceNumber,
        present: std::collections::BTreeSet<SequenceNumber>,
    }

    #[derive(Default)]
    pub struct FakeQueueRegistry {
        pub queues: Mutex<Vec<QueueName>>,
        pub reset_calls: Mutex<Vec<QueueName>>,
        pub dequeue_calls: Mutex<Vec<(QueueName, SequenceNumber)>>,
        mirrors: Mutex<HashMap<QueueName, MirrorState>>,
    }

    impl QueueRegistry for FakeQueueRegistry {
        fn replicated_queues(&self) -> Vec<QueueName> {
            self.queues.lock().unwrap().clone()
        }

        fn promote_leftover_replicators(&self) {}

        fn reset_mirror(&self, queue: &QueueName) {
            self.reset_calls.lock().unwrap().push(queue.clone());
            self.mirrors.lock().unwrap().insert(queue.clone(), MirrorState::default());
        }

        fn dequeue(&self, queue: &QueueName, id: SequenceNumber) {
            self.dequeue_calls.lock().unwrap().push((queue.clone(), id));
            if let Some(mirror) = self.mirrors.lock().unwrap().get_mut(queue) {
                mirror.present.remove(&id);
            }
        }

        fn position(&self, queue: &QueueName) -> SequenceNumber {
            self.mirrors.lock().unwrap().get(queue).map_or(SequenceNumber::ZERO, |m| m.position)
        }

        fn set_position(&self, queue: &QueueName, position: SequenceNumber) {
            self.mirrors.lock().unwrap().entry(queue.clone()).or_default().position = position;
        }

        fn enqueue(&self, queue: &QueueName, _body: Bytes) -> SequenceNumber {
            let mut mirrors = self.mirrors.lock().unwrap();
            let mirror = mirrors.entry(queue.clone()).or_default();
            let id = mirror.position;
            mirror.present.insert(id);
            mirror.position = id.next();
            id
        }
    }

    impl FakeQueueRegistry {
        /// True iff `id` is currently present (enqueued and not yet
        /// dequeued) on `queue`'s mirror — used by tests to check
        /// convergence and the no-gap-after-position-event property.
        pub fn contains(&self, queue: &QueueName, id: SequenceNumber) -> bool {
            self.mirrors.lock().unwrap().get(queue).is_some_and(|m| m.present.contains(&id))
        }
    }

    #[derive(Default)]
    pub struct FakeMembershipPublisher {
        pub statuses: Mutex<Vec<BrokerInfo>>,
        pub added: Mutex<Vec<BrokerInfo>>,
        pub removed: Mutex<Vec<BrokerInfo>>,
    }

    impl MembershipPublisher for FakeMembershipPublisher {
        fn set_status(&self, broker: &BrokerInfo) {
            self.statuses.lock().unwrap().push(broker.clone());
        }

        fn add(&self, broker: &BrokerInfo) {
            self.added.lock().unwrap().push(broker.clone());
        }

        fn remove(&self, broker: &BrokerInfo) {
            self.removed.lock().unwrap().push(broker.clone());
        }
    }

    pub struct FakeTimerTask {
        pub cancelled: std::sync::Arc<std::sync::atomic::AtomicBool>,
    }

    impl TimerTask for FakeTimerTask {
        fn cancel(&self) {
            self.cancelled.store(true, std::sync::atomic::Ordering::SeqCst);
        }
    }

    /// Runs every scheduled callback synchronously and immediately when
    /// `fire_all` is called, rather than on a real clock — tests control
    /// time explicitly instead of sleeping.
    #[derive(Default)]
    pub struct FakeTimerService {
        pending: Mutex<Vec<(std::sync::Arc<std::sync::atomic::AtomicBool>, Box<dyn FnOnce() + Send>)>>,
    }

    impl FakeTimerService {
        /// Runs every pending callback, catching panics the way a real
        /// timer thread must so one broken callback can't take the whole
        /// timer thread down with it (spec.md §7).
        pub fn fire_all(&self) {
            let tasks = std::mem::take(&mut *self.pending.lock().unwrap());
            for (cancelled, callback) in tasks {
                if !cancelled.load(std::sync::atomic::Ordering::SeqCst) {
                    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)).is_err() {
                        tracing::error!("panic inside timer callback; timer thread continues");
                    }
                }
            }
        }
    }

    impl TimerService for FakeTimerService {
        fn add(&self, _delay: Duration, callback: Box<dyn FnOnce() + Send>) -> Box<dyn TimerTask> {
            let cancelled = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
            self.pending.lock().unwrap().push((cancelled.clone(), callback));
            Box::new(FakeTimerTask { cancelled })
        }
    }

    /// Records bridge/subscription requests without performing any real
    /// AMQP handshaking; tests call `complete_bridge` to simulate the
    /// handshake finishing.
    #[derive(Default)]
    pub struct FakeReplicationLink {
        pending_bridge: Mutex<Option<Box<dyn FnOnce() + Send>>>,
        pub subscribed: Mutex<Vec<QueueName>>,
    }

    impl FakeReplicationLink {
        /// Fires the `on_ready` callback from the most recent
        /// `declare_bridge` call, simulating the bridge handshake
        /// completing.
        pub fn complete_bridge(&self) {
            if let Some(on_ready) = self.pending_bridge.lock().unwrap().take() {
                on_ready();
            }
        }
    }

    impl ReplicationLink for FakeReplicationLink {
        fn declare_bridge(&self, _source_queue: &QueueName, _destination_exchange: &str, on_ready: Box<dyn FnOnce() + Send>) {
            *self.pending_bridge.lock().unwrap() = Some(on_ready);
        }

        fn subscribe_replicating(&self, source_queue: &QueueName) {
            self.subscribed.lock().unwrap().push(source_queue.clone());
        }
    }
}
