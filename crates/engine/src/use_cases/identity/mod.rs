//! Identity mapping for combat actions created offline.
//!
//! A new action gets a client-generated [`LocalId`] immediately and is cached
//! as `Pending`. A background worker sends the create; once the backend
//! acknowledges it, the assigned [`RemoteId`] is written back into the cache
//! and the action becomes `Confirmed`.
//!
//! Each record has its own FIFO of remote operations. Updates and deletes
//! queue behind the record's create, so no operation for a record reaches the
//! remote before its create has been acknowledged.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::task::TaskTracker;

use herosheet_domain::{
    CharacterId, CombatAction, CombatActionCollection, CombatActionData, CombatActionPatch,
    LocalId, RemoteId, SubRecordKey,
};

use crate::infrastructure::ports::{ClockPort, LocalCache, RandomPort, RemoteError, RemoteStore};
use crate::use_cases::sync::{SyncError, SyncEvent, SyncEvents};

#[derive(Debug, Clone)]
enum SubRecordOp {
    Create(CombatActionData),
    Update(CombatActionData),
    Delete,
}

impl SubRecordOp {
    fn name(&self) -> &'static str {
        match self {
            SubRecordOp::Create(_) => "create",
            SubRecordOp::Update(_) => "update",
            SubRecordOp::Delete => "delete",
        }
    }
}

#[derive(Default)]
struct QueueState {
    ops: VecDeque<SubRecordOp>,
    running: bool,
    create_in_flight: bool,
    remote_id: Option<RemoteId>,
    /// The cache holds `remote_id`, or the record no longer exists.
    recorded: bool,
}

/// Pending remote operations for one combat action.
struct RecordQueue {
    parent_id: CharacterId,
    state: Mutex<QueueState>,
}

impl RecordQueue {
    fn new(parent_id: CharacterId) -> Self {
        Self {
            parent_id,
            state: Mutex::new(QueueState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

enum Acked {
    Created(RemoteId),
    Done,
}

/// Maps client ids to backend ids and orders sub-record traffic.
#[derive(Clone)]
pub struct IdentityMapper {
    inner: Arc<MapperInner>,
}

struct MapperInner {
    local: Arc<dyn LocalCache>,
    remote: Arc<dyn RemoteStore>,
    clock: Arc<dyn ClockPort>,
    random: Arc<dyn RandomPort>,
    tasks: TaskTracker,
    events: SyncEvents,
    /// Guards read-modify-write of one parent's cached collection.
    parents: DashMap<CharacterId, Arc<AsyncMutex<()>>>,
    queues: DashMap<LocalId, Arc<RecordQueue>>,
}

impl IdentityMapper {
    pub fn new(
        local: Arc<dyn LocalCache>,
        remote: Arc<dyn RemoteStore>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
        tasks: TaskTracker,
        events: SyncEvents,
    ) -> Self {
        Self {
            inner: Arc::new(MapperInner {
                local,
                remote,
                clock,
                random,
                tasks,
                events,
                parents: DashMap::new(),
                queues: DashMap::new(),
            }),
        }
    }

    /// Creates a combat action locally and returns it right away, still
    /// `Pending`. The remote create runs in the background.
    pub async fn create(
        &self,
        parent_id: &CharacterId,
        data: CombatActionData,
    ) -> Result<CombatAction, SyncError> {
        data.validate()?;
        let local_id = LocalId::generate(self.inner.clock.now(), self.inner.random.gen_suffix());
        let action = CombatAction::pending(local_id.clone(), parent_id.clone(), data.clone());

        {
            let lock = self.inner.parent_lock(parent_id);
            let _guard = lock.lock().await;
            let mut actions = self.inner.local.get_actions(parent_id).await?;
            actions.insert(action.clone());
            self.inner.local.put_actions(&actions).await?;
        }

        tracing::debug!(parent_id = %parent_id, local_id = %local_id, "Created combat action locally");
        self.inner
            .enqueue(parent_id, &local_id, None, SubRecordOp::Create(data));
        Ok(action)
    }

    /// Updates a combat action addressed by either of its ids.
    pub async fn update(
        &self,
        parent_id: &CharacterId,
        key: &SubRecordKey,
        patch: CombatActionPatch,
    ) -> Result<CombatAction, SyncError> {
        patch.validate()?;
        let lock = self.inner.parent_lock(parent_id);
        let _guard = lock.lock().await;
        let mut actions = self.inner.local.get_actions(parent_id).await?;
        let updated = actions
            .update(key, patch)
            .cloned()
            .ok_or_else(|| SyncError::SubRecordNotFound(key.to_string()))?;
        self.inner.local.put_actions(&actions).await?;

        // Still under the parent lock: a confirm cannot retire the queue
        // between reading the identity and enqueueing.
        self.inner.enqueue(
            parent_id,
            updated.local_id(),
            updated.remote_id().cloned(),
            SubRecordOp::Update(updated.data.clone()),
        );
        Ok(updated)
    }

    /// Deletes a combat action locally and, once it exists remotely, there too.
    pub async fn delete(&self, parent_id: &CharacterId, key: &SubRecordKey) -> Result<(), SyncError> {
        let lock = self.inner.parent_lock(parent_id);
        let _guard = lock.lock().await;
        let mut actions = self.inner.local.get_actions(parent_id).await?;
        let removed = actions
            .remove(key)
            .ok_or_else(|| SyncError::SubRecordNotFound(key.to_string()))?;
        self.inner.local.put_actions(&actions).await?;

        let local_id = removed.local_id().clone();
        if removed.remote_id().is_none() && self.inner.discard_unsent(&local_id) {
            tracing::debug!(
                parent_id = %parent_id,
                local_id = %local_id,
                "Deleted combat action that never reached the remote"
            );
            return Ok(());
        }

        self.inner.enqueue(
            parent_id,
            &local_id,
            removed.remote_id().cloned(),
            SubRecordOp::Delete,
        );
        Ok(())
    }

    pub async fn list(&self, parent_id: &CharacterId) -> Result<CombatActionCollection, SyncError> {
        Ok(self.inner.local.get_actions(parent_id).await?)
    }

    /// Restarts remote traffic for a parent's unconfirmed actions. Returns how
    /// many workers were started.
    ///
    /// An action whose create was acknowledged but never recorded in the
    /// cache gets its remote id written back without a second create.
    pub async fn resume(&self, parent_id: &CharacterId) -> Result<usize, SyncError> {
        let actions = self.inner.local.get_actions(parent_id).await?;
        let mut resumed = 0;
        for action in actions.pending() {
            let queue = self.inner.queue_for(parent_id, action.local_id());
            let start = {
                let mut state = queue.lock();
                if state.ops.is_empty() && !state.recorded {
                    state.ops.push_back(SubRecordOp::Create(action.data.clone()));
                }
                !state.ops.is_empty() && !std::mem::replace(&mut state.running, true)
            };
            if start {
                self.inner.spawn_worker(action.local_id().clone(), queue);
                resumed += 1;
            }
        }
        Ok(resumed)
    }

    /// Forgets every action of a deleted parent, locally and in the queues.
    pub async fn drop_parent(&self, parent_id: &CharacterId) -> Result<(), SyncError> {
        let lock = self.inner.parent_lock(parent_id);
        let _guard = lock.lock().await;
        self.inner.local.delete_actions(parent_id).await?;
        self.inner.queues.retain(|_, queue| {
            if queue.parent_id == *parent_id {
                queue.lock().ops.clear();
                false
            } else {
                true
            }
        });
        Ok(())
    }

    /// Waits for every queued sub-record operation that can currently finish.
    pub async fn drain(&self) {
        crate::use_cases::sync::wait_idle(&self.inner.tasks).await;
    }
}

impl MapperInner {
    fn parent_lock(&self, parent_id: &CharacterId) -> Arc<AsyncMutex<()>> {
        self.parents.entry(parent_id.clone()).or_default().clone()
    }

    fn queue_for(&self, parent_id: &CharacterId, local_id: &LocalId) -> Arc<RecordQueue> {
        self.queues
            .entry(local_id.clone())
            .or_insert_with(|| Arc::new(RecordQueue::new(parent_id.clone())))
            .clone()
    }

    /// Appends `op` to the record's queue and starts its worker if idle.
    fn enqueue(
        self: &Arc<Self>,
        parent_id: &CharacterId,
        local_id: &LocalId,
        known_remote_id: Option<RemoteId>,
        op: SubRecordOp,
    ) {
        let entry = self
            .queues
            .entry(local_id.clone())
            .or_insert_with(|| Arc::new(RecordQueue::new(parent_id.clone())));
        let start = {
            let mut state = entry.lock();
            if state.remote_id.is_none() {
                state.remote_id = known_remote_id;
            }
            state.ops.push_back(op);
            !std::mem::replace(&mut state.running, true)
        };
        let queue = entry.clone();
        drop(entry);

        if start {
            self.spawn_worker(local_id.clone(), queue);
        }
    }

    /// Drops the queued create of a record the remote never saw. Returns
    /// false when the create is in flight or already acknowledged.
    fn discard_unsent(&self, local_id: &LocalId) -> bool {
        let Some(queue) = self.queues.get(local_id).map(|entry| entry.clone()) else {
            // No queue and no remote id: nothing for this record is queued.
            return true;
        };
        let mut state = queue.lock();
        if state.create_in_flight || state.remote_id.is_some() {
            return false;
        }
        state.ops.clear();
        drop(state);
        self.queues.remove(local_id);
        true
    }

    fn spawn_worker(self: &Arc<Self>, local_id: LocalId, queue: Arc<RecordQueue>) {
        let inner = self.clone();
        self.tasks
            .spawn(async move { inner.run_queue(local_id, queue).await });
    }

    /// Sends one record's operations in order. Stops on a connectivity
    /// failure and leaves the failed operation at the head of the queue.
    async fn run_queue(self: Arc<Self>, local_id: LocalId, queue: Arc<RecordQueue>) {
        let parent_id = queue.parent_id.clone();
        loop {
            let (op, remote_id) = {
                let mut state = queue.lock();
                let Some(op) = state.ops.front().cloned() else {
                    state.running = false;
                    break;
                };
                if matches!(op, SubRecordOp::Create(_)) {
                    state.create_in_flight = true;
                }
                (op, state.remote_id.clone())
            };
            let op_name = op.name();
            let is_delete = matches!(op, SubRecordOp::Delete);

            let outcome = match (op, remote_id) {
                (SubRecordOp::Create(data), None) => self
                    .remote
                    .create_action(&parent_id, &data)
                    .await
                    .map(Acked::Created),
                // Acknowledged earlier; only the cache write is left.
                (SubRecordOp::Create(_), Some(remote_id)) => Ok(Acked::Created(remote_id)),
                (SubRecordOp::Update(data), Some(remote_id)) => self
                    .remote
                    .update_action(&parent_id, &remote_id, &data)
                    .await
                    .map(|()| Acked::Done),
                (SubRecordOp::Delete, Some(remote_id)) => self
                    .remote
                    .delete_action(&parent_id, &remote_id)
                    .await
                    .map(|()| Acked::Done),
                (_, None) => {
                    tracing::error!(
                        parent_id = %parent_id,
                        local_id = %local_id,
                        operation = op_name,
                        "Dropping combat action operation with no acknowledged create"
                    );
                    Ok(Acked::Done)
                }
            };

            match outcome {
                Ok(Acked::Created(remote_id)) => {
                    {
                        let mut state = queue.lock();
                        state.create_in_flight = false;
                        state.remote_id = Some(remote_id.clone());
                        state.ops.pop_front();
                    }
                    match self.confirm(&parent_id, &local_id, remote_id).await {
                        Ok(()) => queue.lock().recorded = true,
                        // The queue keeps the remote id until a resume records it.
                        Err(e) => tracing::error!(
                            parent_id = %parent_id,
                            local_id = %local_id,
                            error = %e,
                            "Failed to record remote id in local cache"
                        ),
                    }
                }
                Ok(Acked::Done) => {
                    let mut state = queue.lock();
                    state.ops.pop_front();
                    state.recorded |= is_delete;
                }
                Err(e @ RemoteError::Network(_)) => {
                    let mut state = queue.lock();
                    state.create_in_flight = false;
                    state.running = false;
                    tracing::debug!(
                        parent_id = %parent_id,
                        local_id = %local_id,
                        operation = op_name,
                        error = %e,
                        "Remote unreachable, combat action operation stays queued"
                    );
                    return;
                }
                Err(e @ RemoteError::Rejected(_)) => {
                    tracing::error!(
                        parent_id = %parent_id,
                        local_id = %local_id,
                        operation = op_name,
                        error = %e,
                        "Remote rejected combat action operation"
                    );
                    let mut state = queue.lock();
                    let was_create = std::mem::take(&mut state.create_in_flight);
                    state.ops.pop_front();
                    state.recorded |= is_delete;
                    if was_create {
                        // Nothing after a refused create can be addressed remotely.
                        state.ops.clear();
                        self.events.emit(SyncEvent::SubRecordRejected {
                            parent_id: parent_id.clone(),
                            local_id: local_id.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        self.queues.remove_if(&local_id, |_, current| {
            Arc::ptr_eq(current, &queue) && {
                let state = current.lock();
                state.ops.is_empty() && !state.running && state.recorded
            }
        });
    }

    /// Writes the acknowledged remote id into the cached collection.
    async fn confirm(
        &self,
        parent_id: &CharacterId,
        local_id: &LocalId,
        remote_id: RemoteId,
    ) -> Result<(), SyncError> {
        let lock = self.parent_lock(parent_id);
        let _guard = lock.lock().await;
        let mut actions = self.local.get_actions(parent_id).await?;
        if !actions.confirm(local_id, remote_id.clone()) {
            tracing::debug!(
                parent_id = %parent_id,
                local_id = %local_id,
                "Confirmed combat action is no longer cached"
            );
            return Ok(());
        }
        self.local.put_actions(&actions).await?;

        tracing::info!(
            parent_id = %parent_id,
            local_id = %local_id,
            remote_id = %remote_id,
            "Combat action confirmed by remote"
        );
        self.events.emit(SyncEvent::SubRecordConfirmed {
            parent_id: parent_id.clone(),
            local_id: local_id.clone(),
            remote_id,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::{SequenceRandom, SteppingClock};
    use crate::infrastructure::in_memory::{InMemoryLocalCache, InMemoryRemoteStore, RemoteCall};
    use crate::infrastructure::ports::MockRemoteStore;
    use herosheet_domain::{ActionCategory, Identity};

    struct Harness {
        mapper: IdentityMapper,
        local: Arc<InMemoryLocalCache>,
        remote: Arc<InMemoryRemoteStore>,
        events: SyncEvents,
    }

    fn harness() -> Harness {
        let clock = Arc::new(SteppingClock::starting_at(1_700_000_000));
        let local = Arc::new(InMemoryLocalCache::new(clock.clone()));
        let remote = Arc::new(InMemoryRemoteStore::new());
        let events = SyncEvents::new();
        let mapper = IdentityMapper::new(
            local.clone(),
            remote.clone(),
            clock,
            Arc::new(SequenceRandom::new()),
            TaskTracker::new(),
            events.clone(),
        );
        Harness {
            mapper,
            local,
            remote,
            events,
        }
    }

    fn parent() -> CharacterId {
        CharacterId::new("c1")
    }

    fn greatsword() -> CombatActionData {
        CombatActionData::new(ActionCategory::Action, "Greatsword")
    }

    #[tokio::test]
    async fn create_returns_pending_record_immediately() {
        let h = harness();
        h.remote.set_offline(true);

        let action = h.mapper.create(&parent(), greatsword()).await.expect("create");

        assert!(matches!(action.identity, Identity::Pending { .. }));
        let cached = h.mapper.list(&parent()).await.expect("list");
        assert_eq!(cached.find(&action.local_id().clone().into()), Some(&action));
    }

    #[tokio::test]
    async fn acknowledged_create_confirms_cached_record() {
        let h = harness();
        let mut events = h.events.subscribe();

        let action = h.mapper.create(&parent(), greatsword()).await.expect("create");
        h.mapper.drain().await;

        let cached = h.local.get_actions(&parent()).await.expect("get");
        let confirmed = cached
            .find(&action.local_id().clone().into())
            .expect("still cached");
        let remote_id = confirmed.remote_id().expect("confirmed").clone();
        assert_eq!(confirmed.local_id(), action.local_id());
        assert_eq!(h.remote.action(&remote_id).await, Some(greatsword()));

        // Addressable by either id.
        assert!(cached.find(&SubRecordKey::Remote(remote_id.clone())).is_some());
        assert_eq!(
            events.try_recv().ok(),
            Some(SyncEvent::SubRecordConfirmed {
                parent_id: parent(),
                local_id: action.local_id().clone(),
                remote_id,
            })
        );
    }

    #[tokio::test]
    async fn update_waits_for_create_acknowledgement() {
        let h = harness();
        let gate = h.remote.hold_action_creates();

        let action = h.mapper.create(&parent(), greatsword()).await.expect("create");
        h.mapper
            .update(
                &parent(),
                &action.local_id().clone().into(),
                CombatActionPatch {
                    attack_bonus: Some(7),
                    ..CombatActionPatch::default()
                },
            )
            .await
            .expect("update");

        // Let the worker reach the held create.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!h
            .remote
            .calls()
            .iter()
            .any(|call| matches!(call, RemoteCall::UpdateAction(..))));

        gate.release();
        h.mapper.drain().await;

        let calls = h.remote.calls();
        let create_at = calls
            .iter()
            .position(|call| matches!(call, RemoteCall::CreateAction(..)))
            .expect("create sent");
        let update_at = calls
            .iter()
            .position(|call| matches!(call, RemoteCall::UpdateAction(..)))
            .expect("update sent");
        assert!(create_at < update_at);

        let cached = h.mapper.list(&parent()).await.expect("list");
        let remote_id = cached
            .find(&action.local_id().clone().into())
            .and_then(|a| a.remote_id().cloned())
            .expect("confirmed");
        assert_eq!(
            h.remote.action(&remote_id).await.and_then(|d| d.attack_bonus),
            Some(7)
        );
    }

    #[tokio::test]
    async fn delete_of_unsent_record_never_reaches_remote() {
        let h = harness();
        h.remote.set_offline(true);
        let action = h.mapper.create(&parent(), greatsword()).await.expect("create");
        h.mapper.drain().await;

        h.remote.set_offline(false);
        h.mapper
            .delete(&parent(), &action.local_id().clone().into())
            .await
            .expect("delete");
        h.mapper.drain().await;

        assert!(h.mapper.list(&parent()).await.expect("list").is_empty());
        assert_eq!(h.remote.action_count().await, 0);
        assert!(!h
            .remote
            .calls()
            .iter()
            .any(|call| matches!(call, RemoteCall::DeleteAction(..))));
    }

    #[tokio::test]
    async fn delete_of_confirmed_record_uses_remote_id() {
        let h = harness();
        let action = h.mapper.create(&parent(), greatsword()).await.expect("create");
        h.mapper.drain().await;

        h.mapper
            .delete(&parent(), &action.local_id().clone().into())
            .await
            .expect("delete");
        h.mapper.drain().await;

        assert_eq!(h.remote.action_count().await, 0);
        assert!(h
            .remote
            .calls()
            .iter()
            .any(|call| matches!(call, RemoteCall::DeleteAction(..))));
    }

    #[tokio::test]
    async fn queued_operations_resume_after_reconnect() {
        let h = harness();
        h.remote.set_offline(true);
        let action = h.mapper.create(&parent(), greatsword()).await.expect("create");
        h.mapper.drain().await;
        assert_eq!(h.remote.action_count().await, 0);

        h.remote.set_offline(false);
        h.mapper
            .update(
                &parent(),
                &action.local_id().clone().into(),
                CombatActionPatch {
                    uses_remaining: Some(2),
                    ..CombatActionPatch::default()
                },
            )
            .await
            .expect("update");
        h.mapper.drain().await;

        assert_eq!(h.remote.action_count().await, 1);
        let cached = h.mapper.list(&parent()).await.expect("list");
        assert_eq!(cached.pending().count(), 0);
    }

    #[tokio::test]
    async fn resume_resends_pending_creates() {
        let h = harness();
        let mut actions = CombatActionCollection::new(parent());
        actions.insert(CombatAction::pending(
            LocalId::new("0001-a"),
            parent(),
            greatsword(),
        ));
        h.local.put_actions(&actions).await.expect("seed");

        let resumed = h.mapper.resume(&parent()).await.expect("resume");
        h.mapper.drain().await;

        assert_eq!(resumed, 1);
        assert_eq!(h.remote.action_count().await, 1);
        assert_eq!(h.mapper.resume(&parent()).await.expect("resume"), 0);
    }

    #[tokio::test]
    async fn failed_confirm_keeps_remote_id_for_later_operations() {
        let h = harness();
        let action = h.mapper.create(&parent(), greatsword()).await.expect("create");
        let key: SubRecordKey = action.local_id().clone().into();

        // The create is acknowledged but the cache refuses the remote id.
        h.local.set_fail_writes(true);
        h.mapper.drain().await;
        h.local.set_fail_writes(false);
        assert_eq!(h.mapper.list(&parent()).await.expect("list").pending().count(), 1);

        h.mapper
            .update(
                &parent(),
                &key,
                CombatActionPatch {
                    attack_bonus: Some(5),
                    ..CombatActionPatch::default()
                },
            )
            .await
            .expect("update");
        h.mapper.drain().await;
        assert!(h
            .remote
            .calls()
            .iter()
            .any(|call| matches!(call, RemoteCall::UpdateAction(..))));

        assert_eq!(h.mapper.resume(&parent()).await.expect("resume"), 1);
        h.mapper.drain().await;

        let creates = h
            .remote
            .calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::CreateAction(..)))
            .count();
        assert_eq!(creates, 1);
        assert_eq!(h.remote.action_count().await, 1);

        let cached = h.mapper.list(&parent()).await.expect("list");
        let remote_id = cached
            .find(&key)
            .and_then(|a| a.remote_id().cloned())
            .expect("confirmed after resume");
        assert_eq!(
            h.remote.action(&remote_id).await.and_then(|d| d.attack_bonus),
            Some(5)
        );
        assert_eq!(h.mapper.resume(&parent()).await.expect("resume"), 0);
    }

    #[tokio::test]
    async fn delete_during_in_flight_create_removes_remote_row() {
        let h = harness();
        let gate = h.remote.hold_action_creates();
        let action = h.mapper.create(&parent(), greatsword()).await.expect("create");

        // Let the worker reach the held create.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        h.mapper
            .delete(&parent(), &action.local_id().clone().into())
            .await
            .expect("delete");

        gate.release();
        h.mapper.drain().await;

        assert!(h.mapper.list(&parent()).await.expect("list").is_empty());
        assert_eq!(h.remote.action_count().await, 0);
        let calls = h.remote.calls();
        let create_at = calls
            .iter()
            .position(|call| matches!(call, RemoteCall::CreateAction(..)))
            .expect("create sent");
        let delete_at = calls
            .iter()
            .position(|call| matches!(call, RemoteCall::DeleteAction(..)))
            .expect("delete sent");
        assert!(create_at < delete_at);
        assert!(h.mapper.inner.queues.is_empty());
    }

    #[tokio::test]
    async fn rejected_create_is_reported_and_stays_local() {
        let mut remote = MockRemoteStore::new();
        remote
            .expect_create_action()
            .times(1)
            .returning(|_, _| Err(RemoteError::rejected("unknown damage type")));
        let clock = Arc::new(SteppingClock::starting_at(1));
        let local = Arc::new(InMemoryLocalCache::new(clock.clone()));
        let events = SyncEvents::new();
        let mapper = IdentityMapper::new(
            local.clone(),
            Arc::new(remote),
            clock,
            Arc::new(SequenceRandom::new()),
            TaskTracker::new(),
            events.clone(),
        );
        let mut rx = events.subscribe();

        let action = mapper.create(&parent(), greatsword()).await.expect("create");
        mapper.drain().await;

        assert!(matches!(
            rx.try_recv(),
            Ok(SyncEvent::SubRecordRejected { local_id, .. }) if local_id == *action.local_id()
        ));
        let cached = local.get_actions(&parent()).await.expect("get");
        assert_eq!(cached.pending().count(), 1);
    }

    #[tokio::test]
    async fn unknown_key_is_not_found() {
        let h = harness();
        let err = h
            .mapper
            .update(
                &parent(),
                &SubRecordKey::Local(LocalId::new("missing")),
                CombatActionPatch::default(),
            )
            .await
            .expect_err("missing");
        assert_eq!(err, SyncError::SubRecordNotFound("local:missing".to_string()));
    }

    #[tokio::test]
    async fn drop_parent_clears_cache_and_queues() {
        let h = harness();
        h.remote.set_offline(true);
        h.mapper.create(&parent(), greatsword()).await.expect("create");
        h.mapper.drain().await;

        h.mapper.drop_parent(&parent()).await.expect("drop");
        h.remote.set_offline(false);
        assert_eq!(h.mapper.resume(&parent()).await.expect("resume"), 0);
        h.mapper.drain().await;

        assert!(h.mapper.list(&parent()).await.expect("list").is_empty());
        assert_eq!(h.remote.action_count().await, 0);
    }
}
