//! Primary role controller.
//!
//! Owns every remote backup, mediates the broker-observer and
//! connection-observer callbacks, and publishes the broker's own
//! `recovering` → `active` transition. Every public entry point that must
//! also touch the queue registry, a queue's enqueue path, or the
//! membership publisher's network side follows one shape: mutate under
//! `state`, capture what needs to be published, release the lock, then
//! publish. Collapsing that into a single critical section would let this
//! controller hold its lock while blocked on a lock the queue registry
//! already holds while calling in here.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::classifier::ReplicationClassifier;
use crate::contracts::{MembershipPublisher, QueueRegistry, TimerService, TimerTask};
use crate::error::HaError;
use crate::guard::QueueCounter;
use crate::remote_backup::{ConnectionHandle, RemoteBackup};
use crate::types::{arg_keys, ArgValue, BrokerInfo, BrokerStatus, BrokerUuid, Descriptor, QueueName, ReplicationLevel};

/// Identity of an entry in the primary's `replicas` table: a replicating
/// subscription for one queue, hosted by one backup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub backup: BrokerUuid,
    pub queue: QueueName,
}

/// Weak-referenced observer notified when a replicating subscription
/// cancels mid-transaction.
///
/// Kept as a `Weak` in `PrimaryState::tx_observers` so the observer's
/// lifetime is owned by whoever started the transaction, not by the
/// controller; a lookup that finds an expired weak reference treats the
/// transaction as already gone.
#[derive(Debug)]
pub struct TxObserver {
    tx_queue: QueueName,
}

impl TxObserver {
    fn new(tx_queue: QueueName) -> Self {
        Self { tx_queue }
    }

    pub fn tx_queue(&self) -> &QueueName {
        &self.tx_queue
    }

    fn notify_replica_removed(&self, subscription: &SubscriptionHandle) {
        debug!(
            tx_queue = %self.tx_queue,
            backup = %subscription.backup,
            queue = %subscription.queue,
            "replicating subscription removed mid-transaction"
        );
    }
}

fn synthesize_tx_queue_name(tx_id: &str) -> QueueName {
    QueueName::new(format!("qpid.tx-{tx_id}"))
}

#[derive(Default)]
struct PrimaryState {
    backups: HashMap<BrokerUuid, RemoteBackup>,
    expected_backups: HashSet<BrokerUuid>,
    replicas: HashSet<SubscriptionHandle>,
    queue_counters: HashMap<QueueName, QueueCounter>,
    tx_observers: HashMap<QueueName, Weak<TxObserver>>,
    active: bool,
}

impl PrimaryState {
    fn counter_for(&mut self, queue: &QueueName) -> QueueCounter {
        self.queue_counters
            .entry(queue.clone())
            .or_insert_with(QueueCounter::new)
            .clone()
    }
}

/// The process-wide replication state machine for a broker currently
/// serving as primary.
pub struct PrimaryRole {
    state: Mutex<PrimaryState>,
    self_info: Mutex<BrokerInfo>,
    timer: Mutex<Option<Box<dyn TimerTask>>>,
    queue_registry: Arc<dyn QueueRegistry>,
    membership: Arc<dyn MembershipPublisher>,
    #[allow(dead_code)]
    timer_service: Arc<dyn TimerService>,
    classifier: ReplicationClassifier,
    #[allow(dead_code)]
    backup_timeout: Duration,
    max_catchup_queues: usize,
}

impl PrimaryRole {
    /// Promotes this broker to primary with expected backups `expected`.
    ///
    /// Guards are installed on every pre-existing queue for every expected
    /// backup before this call returns, and before the connection observer
    /// that admits client traffic is wired up by the caller — clients must
    /// never be able to enqueue onto a queue that has no guard yet.
    pub fn promote(
        mut self_info: BrokerInfo,
        expected: Vec<BrokerInfo>,
        queue_registry: Arc<dyn QueueRegistry>,
        membership: Arc<dyn MembershipPublisher>,
        timer_service: Arc<dyn TimerService>,
        classifier: ReplicationClassifier,
        backup_timeout: Duration,
        max_catchup_queues: usize,
    ) -> Arc<PrimaryRole> {
        self_info.status = BrokerStatus::Recovering;
        membership.set_status(&self_info);
        queue_registry.promote_leftover_replicators();

        let all_queues = queue_registry.replicated_queues();

        let mut state = PrimaryState::default();
        for backup_info in expected {
            let uuid = backup_info.system_id;
            let mut backup = RemoteBackup::new(backup_info, true, max_catchup_queues);
            for queue in &all_queues {
                let counter = state.counter_for(queue);
                if backup.catchup_queue(queue.clone(), counter, true).is_err() {
                    error!(backup = %uuid, queue = %queue, "queue-limit budget exhausted while enumerating at promotion");
                }
            }
            backup.start_catchup();
            state.backups.insert(uuid, backup);
            state.expected_backups.insert(uuid);
        }

        let role = Arc::new(PrimaryRole {
            state: Mutex::new(state),
            self_info: Mutex::new(self_info),
            timer: Mutex::new(None),
            queue_registry,
            membership,
            timer_service,
            classifier,
            backup_timeout,
            max_catchup_queues,
        });

        let weak_role = Arc::downgrade(&role);
        let task = role.timer_service.add(
            backup_timeout,
            Box::new(move || {
                if let Some(role) = weak_role.upgrade() {
                    role.timeout_expected_backups();
                }
            }),
        );
        *role.timer.lock().expect("primary timer mutex poisoned") = Some(task);

        role.check_ready();
        role
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().expect("primary state mutex poisoned").active
    }

    // ------------------------------------------------------------------
    // Broker-observer callbacks
    // ------------------------------------------------------------------

    /// A queue was just declared. Classifies it, stamps replication
    /// arguments if it is to be mirrored, and admits it into catch-up on
    /// every known backup.
    pub fn queue_create(&self, descriptor: &mut Descriptor) -> Result<(), HaError> {
        crate::settings::validate(&descriptor.args)?;

        let level = self.classifier.classify(descriptor)?;
        if level == ReplicationLevel::None {
            return Ok(());
        }

        let queue = descriptor.name.clone();
        descriptor.args.set(arg_keys::REPLICATE, ArgValue::Str(level.to_string()));
        descriptor.args.set(arg_keys::HA_UUID, ArgValue::Uuid(Uuid::new_v4()));

        let admission_failure = {
            let mut state = self.state.lock().expect("primary state mutex poisoned");
            let counter = state.counter_for(&queue);
            let backup_uuids: Vec<BrokerUuid> = state.backups.keys().copied().collect();
            let mut failure = None;
            for uuid in backup_uuids {
                let backup = state.backups.get_mut(&uuid).expect("uuid just read from this map");
                if backup.queue_create(queue.clone(), counter.clone()).is_err() {
                    failure = Some(HaError::QueueLimitExceeded {
                        backup: uuid,
                        queue: queue.clone(),
                        limit: backup.budget.limit(),
                    });
                    break;
                }
            }
            failure
        };

        self.check_ready();

        match admission_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Symmetric with `queue_create`: removes `q` from every backup's
    /// catch-up and ready sets.
    pub fn queue_destroy(&self, queue: &QueueName) {
        {
            let mut state = self.state.lock().expect("primary state mutex poisoned");
            for backup in state.backups.values_mut() {
                backup.queue_destroy(queue);
            }
            state.queue_counters.remove(queue);
        }
        self.check_ready();
    }

    /// Stamps a newly declared exchange with its replication level and a
    /// fresh HA UUID; exchanges carry no per-backup catch-up state.
    pub fn exchange_create(&self, descriptor: &mut Descriptor) -> Result<(), HaError> {
        let level = self.classifier.classify(descriptor)?;
        if level > ReplicationLevel::None {
            descriptor.args.set(arg_keys::REPLICATE, ArgValue::Str(level.to_string()));
            descriptor.args.set(arg_keys::HA_UUID, ArgValue::Uuid(Uuid::new_v4()));
        }
        Ok(())
    }

    /// A no-op beyond logging: backups detect a destroyed exchange through
    /// their own link-level failure rather than an explicit notification.
    pub fn exchange_destroy(&self, descriptor: &Descriptor) {
        debug!(exchange = %descriptor.name, "exchange destroyed; backups will observe the missing link");
    }

    /// Attaches a transaction observer, returning a handle the caller
    /// keeps for the lifetime of the transaction.
    pub fn start_tx(&self, tx_id: &str) -> Arc<TxObserver> {
        let tx_queue = synthesize_tx_queue_name(tx_id);
        let observer = Arc::new(TxObserver::new(tx_queue.clone()));
        let mut state = self.state.lock().expect("primary state mutex poisoned");
        state.tx_observers.insert(tx_queue, Arc::downgrade(&observer));
        observer
    }

    /// Distributed transactions are not made atomic across replicas; this
    /// logs and proceeds rather than rejecting the transaction.
    pub fn start_dtx(&self, tx_id: &str) {
        warn!(tx_id, "distributed transaction started; atomicity across replicas is not provided");
    }

    /// Forwards a mid-transaction subscription cancellation to any
    /// transaction observer listening on that queue.
    pub fn remove_replica(&self, subscription: &SubscriptionHandle) {
        let observer = {
            let mut state = self.state.lock().expect("primary state mutex poisoned");
            state.replicas.remove(subscription);
            state.tx_observers.get(&subscription.queue).and_then(Weak::upgrade)
        };
        if let Some(observer) = observer {
            observer.notify_replica_removed(subscription);
        }
    }

    // ------------------------------------------------------------------
    // Readiness
    // ------------------------------------------------------------------

    /// Controller-wide readiness: flips `active` the first time
    /// `expected_backups` empties, and publishes the transition. Monotonic
    /// — once `active`, stays `active` for the lifetime of this role.
    pub fn check_ready(&self) {
        let just_activated = {
            let mut state = self.state.lock().expect("primary state mutex poisoned");
            if !state.active && state.expected_backups.is_empty() {
                state.active = true;
                true
            } else {
                false
            }
        };
        if just_activated {
            let info = {
                let mut self_info = self.self_info.lock().expect("self-info mutex poisoned");
                self_info.status = BrokerStatus::Active;
                self_info.clone()
            };
            self.membership.set_status(&info);
        }
    }

    /// The replicating subscription interface's contract with this
    /// controller (spec.md §1, §4.3): called when the subscription for
    /// `queue` on `backup` reports it has fully caught up. Moves the queue
    /// from catch-up to ready on the named backup, then re-runs that
    /// backup's readiness check. The subscription's own implementation is
    /// out of scope — this is the only hook it needs.
    pub fn replica_ready(&self, backup: BrokerUuid, queue: &QueueName) {
        {
            let mut state = self.state.lock().expect("primary state mutex poisoned");
            if let Some(remote) = state.backups.get_mut(&backup) {
                remote.ready(queue);
            }
        }
        self.check_ready_backup(backup);
    }

    /// Per-backup readiness: reports the backup ready (edge-triggered) and
    /// retires it from `expected_backups`, then re-runs controller-wide
    /// readiness.
    pub fn check_ready_backup(&self, uuid: BrokerUuid) {
        let all_queues: HashSet<QueueName> = self.queue_registry.replicated_queues().into_iter().collect();

        let published = {
            let mut state = self.state.lock().expect("primary state mutex poisoned");
            let became_ready = state
                .backups
                .get_mut(&uuid)
                .is_some_and(|backup| backup.report_ready(&all_queues));
            if became_ready {
                state.expected_backups.remove(&uuid);
                let backup = state.backups.get_mut(&uuid).expect("just confirmed present");
                backup.info.status = BrokerStatus::Ready;
                Some(backup.info.clone())
            } else {
                None
            }
        };

        if let Some(info) = published {
            self.membership.set_status(&info);
        }
        self.check_ready();
    }

    // ------------------------------------------------------------------
    // Expected-backup timeout
    // ------------------------------------------------------------------

    /// Fired once by the single backup-timeout timer armed at promotion.
    /// Any expected backup still without a connection is disconnected and
    /// downgraded to `catchup` in membership; the timer is not rearmed.
    fn timeout_expected_backups(&self) {
        let downgraded: Vec<BrokerInfo> = {
            let mut state = self.state.lock().expect("primary state mutex poisoned");
            let pending: Vec<BrokerUuid> = state.expected_backups.iter().copied().collect();
            let mut downgraded = Vec::new();
            for uuid in pending {
                let has_connection = state
                    .backups
                    .get(&uuid)
                    .is_some_and(|backup| backup.connection.is_some());
                if !has_connection {
                    state.expected_backups.remove(&uuid);
                    if let Some(backup) = state.backups.get_mut(&uuid) {
                        backup.cancel();
                        backup.info.status = BrokerStatus::Catchup;
                        downgraded.push(backup.info.clone());
                    }
                }
            }
            downgraded
        };

        for info in &downgraded {
            warn!(backup = %info.system_id, "expected backup timed out without connecting");
            self.membership.set_status(info);
        }
        self.check_ready();
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// A connection announced `info` in its handshake properties. Callers
    /// must not invoke this for connections with no announced `BrokerInfo`
    /// — those are ordinary client connections.
    pub fn opened(&self, info: BrokerInfo, connection: ConnectionHandle) {
        let uuid = info.system_id;

        {
            let mut state = self.state.lock().expect("primary state mutex poisoned");
            match state.backups.get_mut(&uuid) {
                Some(existing) if existing.connection.is_some() => {
                    error!(backup = %uuid, "backup reconnected before its prior close was observed; replacing stale record");
                    existing.cancel();
                    let expected = existing.expected;
                    let mut fresh = RemoteBackup::new(info, expected, self.max_catchup_queues);
                    fresh.connection = Some(connection);
                    fresh.info.status = BrokerStatus::Catchup;
                    state.backups.insert(uuid, fresh);
                }
                Some(existing) => {
                    existing.connection = Some(connection);
                    if existing.info.status == BrokerStatus::Joining {
                        existing.info.status = BrokerStatus::Catchup;
                    }
                }
                None => {
                    let mut backup = RemoteBackup::new(info, false, self.max_catchup_queues);
                    backup.connection = Some(connection);
                    backup.info.status = BrokerStatus::Catchup;
                    state.backups.insert(uuid, backup);
                }
            }
        }

        let published = {
            let state = self.state.lock().expect("primary state mutex poisoned");
            state.backups.get(&uuid).map(|b| b.info.clone())
        };
        if let Some(info) = published {
            self.membership.set_status(&info);
        }

        self.enumerate_catchup_queues(uuid, false);
        self.check_ready_backup(uuid);
        self.check_ready();
    }

    /// The connection closed. A mismatched handle means the backup
    /// already reconnected elsewhere and this close is stale — a no-op.
    pub fn closed(&self, uuid: BrokerUuid, connection: ConnectionHandle) {
        {
            let mut state = self.state.lock().expect("primary state mutex poisoned");
            match state.backups.get_mut(&uuid) {
                Some(backup) if backup.connection == Some(connection) => {
                    backup.connection = None;
                    backup.cancel();
                    if !backup.expected {
                        state.backups.remove(&uuid);
                    }
                }
                Some(_) => {
                    debug!(backup = %uuid, "stale close for a connection handle already replaced; ignoring");
                }
                None => {
                    debug!(backup = %uuid, "close for an unknown backup uuid; ignoring");
                }
            }
        }
        self.check_ready();
    }

    /// A dedicated error listener's report of a protocol error on a
    /// session, once it has recognised the session as belonging to a known
    /// backup. Logged at debug level and never propagated to the
    /// membership publisher: the backup is expected to disconnect and
    /// retry, not to have this primary retry on its behalf.
    pub fn backup_session_error(&self, uuid: BrokerUuid, description: &str) {
        let is_backup = self
            .state
            .lock()
            .expect("primary state mutex poisoned")
            .backups
            .contains_key(&uuid);
        if is_backup {
            debug!(backup = %uuid, error = description, "protocol error on backup session");
        }
    }

    /// Enumerates every currently replicated queue onto `uuid`'s catch-up
    /// set, skipping queues the backup is already tracking. `create_guard`
    /// controls whether a fresh guard is installed per queue (see
    /// `RemoteBackup::catchup_queue`).
    fn enumerate_catchup_queues(&self, uuid: BrokerUuid, create_guard: bool) {
        let all_queues = self.queue_registry.replicated_queues();
        let mut state = self.state.lock().expect("primary state mutex poisoned");
        let counters: Vec<QueueCounter> = all_queues.iter().map(|q| state.counter_for(q)).collect();
        if let Some(backup) = state.backups.get_mut(&uuid) {
            for (queue, counter) in all_queues.into_iter().zip(counters) {
                let _ = backup.catchup_queue(queue, counter, create_guard);
            }
            backup.start_catchup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::fakes::{FakeMembershipPublisher, FakeQueueRegistry, FakeTimerService};
    use crate::types::ArgumentBag;
    use ha_types::BrokerUuid as RawBrokerUuid;

    fn info(uuid: Uuid, name: &str) -> BrokerInfo {
        BrokerInfo::new(RawBrokerUuid::new(uuid), name, "10.0.0.1:5672")
    }

    fn collaborators() -> (Arc<FakeQueueRegistry>, Arc<FakeMembershipPublisher>, Arc<FakeTimerService>) {
        (
            Arc::new(FakeQueueRegistry::default()),
            Arc::new(FakeMembershipPublisher::default()),
            Arc::new(FakeTimerService::default()),
        )
    }

    #[test]
    fn empty_expected_promotion_activates_immediately() {
        let (registry, membership, timer) = collaborators();
        let role = PrimaryRole::promote(
            info(Uuid::nil(), "primary"),
            vec![],
            registry,
            membership.clone(),
            timer,
            ReplicationClassifier::new(ReplicationLevel::All),
            Duration::from_secs(60),
            100,
        );
        assert!(role.is_active());
        let statuses = membership.statuses.lock().unwrap();
        assert!(statuses.iter().any(|b| b.status == BrokerStatus::Active));
    }

    #[test]
    fn expected_backup_connects_and_becomes_ready() {
        let (registry, membership, timer) = collaborators();
        registry.queues.lock().unwrap().push(QueueName::new("q1"));
        let b1_uuid = Uuid::new_v4();

        let role = PrimaryRole::promote(
            info(Uuid::nil(), "primary"),
            vec![info(b1_uuid, "b1")],
            registry,
            membership,
            timer,
            ReplicationClassifier::new(ReplicationLevel::All),
            Duration::from_secs(60),
            100,
        );
        assert!(!role.is_active());

        role.opened(info(b1_uuid, "b1"), ConnectionHandle(1));
        role.replica_ready(RawBrokerUuid::new(b1_uuid), &QueueName::new("q1"));

        assert!(role.is_active());
    }

    #[test]
    fn expected_backup_times_out_and_activates() {
        let (registry, membership, timer) = collaborators();
        let b1_uuid = Uuid::new_v4();

        let role = PrimaryRole::promote(
            info(Uuid::nil(), "primary"),
            vec![info(b1_uuid, "b1")],
            registry,
            membership.clone(),
            timer.clone(),
            ReplicationClassifier::new(ReplicationLevel::All),
            Duration::from_secs(60),
            100,
        );
        assert!(!role.is_active());

        timer.fire_all();

        assert!(role.is_active());
        let statuses = membership.statuses.lock().unwrap();
        assert!(statuses.iter().any(|b| b.status == BrokerStatus::Catchup));
    }

    #[test]
    fn reconnection_race_replaces_stale_backup_record() {
        let (registry, membership, timer) = collaborators();
        let b1_uuid = Uuid::new_v4();

        let role = PrimaryRole::promote(
            info(Uuid::nil(), "primary"),
            vec![info(b1_uuid, "b1")],
            registry,
            membership,
            timer,
            ReplicationClassifier::new(ReplicationLevel::All),
            Duration::from_secs(60),
            100,
        );

        role.opened(info(b1_uuid, "b1"), ConnectionHandle(1));
        role.opened(info(b1_uuid, "b1"), ConnectionHandle(2));

        let state = role.state.lock().unwrap();
        let backup = state.backups.get(&RawBrokerUuid::new(b1_uuid)).unwrap();
        assert_eq!(backup.connection, Some(ConnectionHandle(2)));
    }

    #[test]
    fn queue_create_stamps_arguments_and_admits_known_backups() {
        let (registry, membership, timer) = collaborators();
        let role = PrimaryRole::promote(
            info(Uuid::nil(), "primary"),
            vec![],
            registry,
            membership,
            timer,
            ReplicationClassifier::new(ReplicationLevel::All),
            Duration::from_secs(60),
            100,
        );

        let mut descriptor = Descriptor::new("orders", ArgumentBag::new());
        role.queue_create(&mut descriptor).unwrap();
        assert_eq!(descriptor.args.get_str(arg_keys::REPLICATE), Some("all"));
        assert!(descriptor.args.get(arg_keys::HA_UUID).is_some());
    }

    #[test]
    fn closed_with_mismatched_handle_is_a_no_op() {
        let (registry, membership, timer) = collaborators();
        let b1_uuid = Uuid::new_v4();

        let role = PrimaryRole::promote(
            info(Uuid::nil(), "primary"),
            vec![info(b1_uuid, "b1")],
            registry,
            membership,
            timer,
            ReplicationClassifier::new(ReplicationLevel::All),
            Duration::from_secs(60),
            100,
        );

        role.opened(info(b1_uuid, "b1"), ConnectionHandle(1));
        role.closed(RawBrokerUuid::new(b1_uuid), ConnectionHandle(999));

        let state = role.state.lock().unwrap();
        assert_eq!(
            state.backups.get(&RawBrokerUuid::new(b1_uuid)).unwrap().connection,
            Some(ConnectionHandle(1))
        );
    }

    #[test]
    fn backup_session_error_is_only_logged_for_known_backups() {
        let (registry, membership, timer) = collaborators();
        let b1_uuid = Uuid::new_v4();

        let role = PrimaryRole::promote(
            info(Uuid::nil(), "primary"),
            vec![],
            registry,
            membership,
            timer,
            ReplicationClassifier::new(ReplicationLevel::All),
            Duration::from_secs(60),
            100,
        );

        // No panic / no special handling required either way; this simply
        // exercises both branches of the lookup.
        role.backup_session_error(RawBrokerUuid::new(b1_uuid), "frame decode failed");
        role.opened(info(b1_uuid, "b1"), ConnectionHandle(1));
        role.backup_session_error(RawBrokerUuid::new(b1_uuid), "frame decode failed");
    }

    #[test]
    fn queue_create_rejects_contradictory_settings() {
        let (registry, membership, timer) = collaborators();
        let role = PrimaryRole::promote(
            info(Uuid::nil(), "primary"),
            vec![],
            registry,
            membership,
            timer,
            ReplicationClassifier::new(ReplicationLevel::All),
            Duration::from_secs(60),
            100,
        );

        let args = ArgumentBag::new()
            .with(arg_keys::LAST_VALUE_QUEUE, crate::types::ArgValue::Bool(true))
            .with(arg_keys::PRIORITIES, crate::types::ArgValue::Int(4));
        let mut descriptor = Descriptor::new("orders", args);
        assert!(matches!(
            role.queue_create(&mut descriptor),
            Err(HaError::ContradictoryQueueSettings(_))
        ));
    }

    #[test]
    fn closed_disconnect_of_unexpected_backup_removes_its_record() {
        let (registry, membership, timer) = collaborators();
        let b1_uuid = Uuid::new_v4();

        let role = PrimaryRole::promote(
            info(Uuid::nil(), "primary"),
            vec![],
            registry,
            membership,
            timer,
            ReplicationClassifier::new(ReplicationLevel::All),
            Duration::from_secs(60),
            100,
        );

        role.opened(info(b1_uuid, "b1"), ConnectionHandle(1));
        role.closed(RawBrokerUuid::new(b1_uuid), ConnectionHandle(1));

        let state = role.state.lock().unwrap();
        assert!(!state.backups.contains_key(&RawBrokerUuid::new(b1_uuid)));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::contracts::fakes::{FakeMembershipPublisher, FakeQueueRegistry, FakeTimerService};
    use ha_types::BrokerUuid as RawBrokerUuid;
    use proptest::prelude::*;

    fn info(uuid: Uuid, name: &str) -> BrokerInfo {
        BrokerInfo::new(RawBrokerUuid::new(uuid), name, "10.0.0.1:5672")
    }

    #[derive(Debug, Clone)]
    enum Event {
        Connect(usize),
        ReplicaReady(usize),
        Disconnect(usize),
        TimerFire,
    }

    /// Picks a backup index in `0..4` unconditionally; callers reduce it
    /// modulo the actual backup count, so any fixed upper bound works here.
    fn event_strategy() -> impl Strategy<Value = Event> {
        prop_oneof![
            (0usize..4).prop_map(Event::Connect),
            (0usize..4).prop_map(Event::ReplicaReady),
            (0usize..4).prop_map(Event::Disconnect),
            Just(Event::TimerFire),
        ]
    }

    proptest! {
        /// P1: for any sequence of connection, readiness, disconnect, and
        /// timer events, `is_active()` is `false` for a prefix and `true`
        /// for the remainder — it never flips back to `false` once set.
        #[test]
        fn activation_is_monotonic(
            backup_count in 1usize..4,
            events in prop::collection::vec(event_strategy(), 0..32),
        ) {
            let uuids: Vec<Uuid> = (0..backup_count).map(|_| Uuid::new_v4()).collect();
            let expected: Vec<BrokerInfo> = uuids.iter().map(|u| info(*u, "backup")).collect();

            let registry = Arc::new(FakeQueueRegistry::default());
            registry.queues.lock().unwrap().push(QueueName::new("q1"));
            let membership = Arc::new(FakeMembershipPublisher::default());
            let timer = Arc::new(FakeTimerService::default());

            let role = PrimaryRole::promote(
                info(Uuid::nil(), "primary"),
                expected,
                registry,
                membership,
                timer.clone(),
                ReplicationClassifier::new(ReplicationLevel::All),
                Duration::from_secs(60),
                100,
            );

            let mut seen_active = false;
            let mut connected = vec![false; backup_count];
            for event in events {
                match event {
                    Event::Connect(i) => {
                        let i = i % backup_count;
                        role.opened(info(uuids[i], "backup"), ConnectionHandle(1));
                        connected[i] = true;
                    }
                    Event::ReplicaReady(i) => {
                        let i = i % backup_count;
                        if connected[i] {
                            role.replica_ready(RawBrokerUuid::new(uuids[i]), &QueueName::new("q1"));
                        }
                    }
                    Event::Disconnect(i) => {
                        let i = i % backup_count;
                        if connected[i] {
                            role.closed(RawBrokerUuid::new(uuids[i]), ConnectionHandle(1));
                            connected[i] = false;
                        }
                    }
                    Event::TimerFire => timer.fire_all(),
                }
                let now_active = role.is_active();
                prop_assert!(now_active || !seen_active);
                seen_active |= now_active;
            }
        }
    }
}
