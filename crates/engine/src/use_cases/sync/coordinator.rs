//! The sync coordinator: local-first reads and writes over a cache and a
//! remote store, with conflict resolution and background pushes.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::FutureExt;
use tokio::sync::broadcast;
use tokio_util::task::TaskTracker;

use herosheet_domain::{
    apply_resolution, detect_conflict, detect_conflict_strict, resolve_conflict, CharacterAggregate,
    CharacterDraft, CharacterId, CharacterPatch, CombatAction, CombatActionCollection,
    CombatActionData, CombatActionPatch, ConflictPolicy, SubRecordKey, Winner,
};

use crate::infrastructure::ports::{
    ClockPort, LocalCache, LocalStorageError, RandomPort, RemoteError, RemoteStore,
};
use crate::use_cases::identity::IdentityMapper;

use super::error::SyncError;
use super::events::{SyncEvent, SyncEvents};
use super::state::{SyncPhase, SyncSlot, SyncState};

/// Conflict handling knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub policy: ConflictPolicy,
    /// Compare content fingerprints when timestamps are equal.
    pub strict_conflicts: bool,
}

/// Owns the per-id sync table. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    local: Arc<dyn LocalCache>,
    remote: Arc<dyn RemoteStore>,
    options: SyncOptions,
    slots: DashMap<CharacterId, Arc<SyncSlot>>,
    tasks: TaskTracker,
    events: SyncEvents,
    identity: IdentityMapper,
}

impl SyncCoordinator {
    pub fn new(
        local: Arc<dyn LocalCache>,
        remote: Arc<dyn RemoteStore>,
        clock: Arc<dyn ClockPort>,
        random: Arc<dyn RandomPort>,
        options: SyncOptions,
    ) -> Self {
        let tasks = TaskTracker::new();
        let events = SyncEvents::new();
        let identity = IdentityMapper::new(
            local.clone(),
            remote.clone(),
            clock,
            random,
            tasks.clone(),
            events.clone(),
        );
        Self {
            inner: Arc::new(Inner {
                local,
                remote,
                options,
                slots: DashMap::new(),
                tasks,
                events,
                identity,
            }),
        }
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// Reads a character, reconciling the cached and remote copies.
    ///
    /// Remote failures are tolerated; only a cache failure is returned.
    /// Concurrent reads of the same id share one in-flight operation.
    pub async fn read(&self, id: &CharacterId) -> Result<Option<CharacterAggregate>, SyncError> {
        let slot = self.inner.slot(id);
        let read = slot.join_read(|| {
            let inner = self.inner.clone();
            let id = id.clone();
            async move { inner.read_once(&id).await }.boxed().shared()
        });
        let result = read.clone().await;
        slot.finish_read(&read);
        result
    }

    /// Applies a partial mutation to the cached aggregate.
    ///
    /// Returns once the cache holds the result; the remote push happens in
    /// the background.
    pub async fn write(
        &self,
        id: &CharacterId,
        patch: CharacterPatch,
    ) -> Result<CharacterAggregate, SyncError> {
        patch.validate()?;
        let slot = self.inner.slot(id);
        let _cache_guard = slot.cache_lock.lock().await;

        let mut current = self
            .inner
            .local
            .get(id)
            .await?
            .ok_or_else(|| SyncError::NotCached(id.clone()))?;
        current.apply_patch(patch);
        let stored = self.inner.local.put(current).await?;

        tracing::debug!(character_id = %id, "Committed local write");
        self.inner.schedule_push(&slot, stored.clone());
        Ok(stored)
    }

    /// Creates a character on the remote, then caches it under the
    /// backend-assigned id.
    pub async fn create_character(
        &self,
        draft: CharacterDraft,
    ) -> Result<CharacterAggregate, SyncError> {
        draft.validate()?;
        let created = self.inner.remote.create(&draft).await?;
        let slot = self.inner.slot(&created.id);
        let _cache_guard = slot.cache_lock.lock().await;

        let remote_timestamp = created.updated_at;
        let stored = self.inner.local.put(created).await?;
        slot.update_state(|state| state.last_known_remote_timestamp = Some(remote_timestamp));

        tracing::info!(character_id = %stored.id, name = %stored.name, "Created character");
        Ok(stored)
    }

    /// Removes a character locally right away and from the remote in the
    /// background. Its combat actions are dropped with it.
    pub async fn delete_character(&self, id: &CharacterId) -> Result<(), SyncError> {
        let slot = self.inner.slot(id);
        {
            let _cache_guard = slot.cache_lock.lock().await;
            self.inner.local.delete(id).await?;
            slot.clear_queued_push();
        }
        self.inner.identity.drop_parent(id).await?;
        self.inner.slots.remove(id);

        let inner = self.inner.clone();
        let task_id = id.clone();
        self.inner.tasks.spawn(async move {
            // Runs after any push already in flight for this id.
            let _remote_guard = slot.remote_lock.lock().await;
            match inner.remote.delete(&task_id).await {
                Ok(()) => tracing::debug!(character_id = %task_id, "Deleted character remotely"),
                Err(e @ RemoteError::Network(_)) => {
                    tracing::debug!(character_id = %task_id, error = %e, "Remote delete dropped")
                }
                Err(e @ RemoteError::Rejected(_)) => {
                    tracing::error!(character_id = %task_id, error = %e, "Remote rejected delete")
                }
            }
        });

        tracing::info!(character_id = %id, "Deleted character");
        Ok(())
    }

    pub async fn list_characters(&self) -> Result<Vec<CharacterId>, SyncError> {
        Ok(self.inner.local.list_ids().await?)
    }

    /// Rebuilds the sync table from the cache after a restart.
    ///
    /// Every cached character is reconciled through [`Self::read`], and
    /// combat actions whose create was never acknowledged are sent again.
    pub async fn restore(&self) -> Result<Vec<CharacterId>, SyncError> {
        let ids = self.inner.local.list_ids().await?;
        for id in &ids {
            self.read(id).await?;
            let resumed = self.inner.identity.resume(id).await?;
            if resumed > 0 {
                tracing::info!(character_id = %id, resumed, "Resumed pending combat actions");
            }
        }
        tracing::info!(count = ids.len(), "Restored sync state from local cache");
        Ok(ids)
    }

    pub fn sync_state(&self, id: &CharacterId) -> Option<SyncState> {
        self.inner.slots.get(id).map(|slot| slot.state())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    /// Waits until every background push and sub-record task has finished.
    pub async fn drain(&self) {
        super::wait_idle(&self.inner.tasks).await;
    }

    // =========================================================================
    // Combat actions
    // =========================================================================

    pub async fn create_sub_record(
        &self,
        parent_id: &CharacterId,
        data: CombatActionData,
    ) -> Result<CombatAction, SyncError> {
        self.inner.require_cached(parent_id).await?;
        self.inner.identity.create(parent_id, data).await
    }

    pub async fn update_sub_record(
        &self,
        parent_id: &CharacterId,
        key: &SubRecordKey,
        patch: CombatActionPatch,
    ) -> Result<CombatAction, SyncError> {
        self.inner.identity.update(parent_id, key, patch).await
    }

    pub async fn delete_sub_record(
        &self,
        parent_id: &CharacterId,
        key: &SubRecordKey,
    ) -> Result<(), SyncError> {
        self.inner.identity.delete(parent_id, key).await
    }

    pub async fn sub_records(
        &self,
        parent_id: &CharacterId,
    ) -> Result<CombatActionCollection, SyncError> {
        self.inner.identity.list(parent_id).await
    }
}

impl Inner {
    fn slot(&self, id: &CharacterId) -> Arc<SyncSlot> {
        self.slots.entry(id.clone()).or_default().clone()
    }

    async fn require_cached(&self, id: &CharacterId) -> Result<(), SyncError> {
        match self.local.get(id).await? {
            Some(_) => Ok(()),
            None => Err(SyncError::NotCached(id.clone())),
        }
    }

    fn is_conflict(&self, local: &CharacterAggregate, remote: &CharacterAggregate) -> bool {
        if self.options.strict_conflicts {
            detect_conflict_strict(Some(local), Some(remote))
        } else {
            detect_conflict(Some(local), Some(remote))
        }
    }

    async fn read_once(
        self: &Arc<Self>,
        id: &CharacterId,
    ) -> Result<Option<CharacterAggregate>, SyncError> {
        let slot = self.slot(id);
        let _remote_guard = slot.remote_lock.lock().await;
        slot.set_phase(SyncPhase::Reading);

        let (local, remote) = tokio::join!(self.local.get(id), self.remote.get(id));
        let outcome = self.reconcile(&slot, id, local, remote).await;

        slot.set_phase(SyncPhase::Idle);
        outcome
    }

    async fn reconcile(
        self: &Arc<Self>,
        slot: &Arc<SyncSlot>,
        id: &CharacterId,
        local: Result<Option<CharacterAggregate>, LocalStorageError>,
        remote: Result<Option<CharacterAggregate>, RemoteError>,
    ) -> Result<Option<CharacterAggregate>, SyncError> {
        let remote = match remote {
            Ok(remote) => {
                if let Some(remote) = &remote {
                    slot.update_state(|state| {
                        state.last_known_remote_timestamp = Some(remote.updated_at)
                    });
                }
                remote
            }
            Err(e) => {
                match &e {
                    RemoteError::Network(_) => {
                        tracing::debug!(character_id = %id, error = %e, "Remote read failed, using local copy")
                    }
                    RemoteError::Rejected(_) => {
                        tracing::warn!(character_id = %id, error = %e, "Remote rejected read, using local copy")
                    }
                }
                slot.update_state(|state| state.last_error = Some(e.to_string()));
                None
            }
        };
        let local = local?;
        slot.set_phase(SyncPhase::Resolved);

        match (local, remote) {
            (None, None) => Ok(None),
            (Some(local), None) => {
                let _cache_guard = slot.cache_lock.lock().await;
                // Push whatever is cached now, which may be newer than `local`.
                if let Some(latest) = self.local.get(id).await? {
                    self.schedule_push(slot, latest);
                }
                Ok(Some(local))
            }
            (None, Some(remote)) => {
                let _cache_guard = slot.cache_lock.lock().await;
                if let Some(current) = self.local.get(id).await? {
                    // Cached concurrently; that copy is newer than our view.
                    return Ok(Some(current));
                }
                let stored = self.local.put(remote).await?;
                tracing::debug!(character_id = %id, "Cached remote-only character");
                Ok(Some(stored))
            }
            (Some(local), Some(remote)) => {
                if !self.is_conflict(&local, &remote) {
                    return Ok(Some(local));
                }
                self.resolve(slot, id, local, remote).await
            }
        }
    }

    async fn resolve(
        self: &Arc<Self>,
        slot: &Arc<SyncSlot>,
        id: &CharacterId,
        local: CharacterAggregate,
        remote: CharacterAggregate,
    ) -> Result<Option<CharacterAggregate>, SyncError> {
        let decision = resolve_conflict(self.options.policy, &local, &remote);
        let merged = apply_resolution(&local, &remote, &decision);

        let fields: Vec<&str> = decision.divergent_fields.iter().map(|f| f.as_str()).collect();
        tracing::info!(
            character_id = %id,
            winner = %decision.winner,
            divergent_fields = ?fields,
            discarded_updated_at = %decision.discarded.updated_at,
            "Resolved sync conflict"
        );
        self.events.emit(SyncEvent::ConflictResolved {
            character_id: id.clone(),
            winner: decision.winner,
            divergent_fields: decision.divergent_fields.clone(),
        });

        let _cache_guard = slot.cache_lock.lock().await;
        let current = self.local.get(id).await?;
        match current {
            Some(current) if current.updated_at == local.updated_at => {}
            Some(current) => {
                // A write landed while we were reading; it wins and pushes itself.
                return Ok(Some(current));
            }
            // Deleted while we were reading.
            None => return Ok(None),
        }

        let stored = if merged.same_content(&local) {
            local
        } else {
            self.local.put(merged).await?
        };

        if matches!(decision.winner, Winner::Local | Winner::Merged) {
            self.schedule_push(slot, stored.clone());
        }
        Ok(Some(stored))
    }

    /// Queues a push of `aggregate`. Callers hold the slot's cache lock, so
    /// queued payloads follow cache order.
    fn schedule_push(self: &Arc<Self>, slot: &Arc<SyncSlot>, aggregate: CharacterAggregate) {
        let id = aggregate.id.clone();
        if slot.queue_push(aggregate) {
            let inner = self.clone();
            let slot = slot.clone();
            self.tasks.spawn(async move { inner.run_pushes(id, slot).await });
        }
    }

    /// Sends queued payloads for one id until none are left.
    async fn run_pushes(self: Arc<Self>, id: CharacterId, slot: Arc<SyncSlot>) {
        loop {
            let _remote_guard = slot.remote_lock.lock().await;
            let Some(aggregate) = slot.next_push() else {
                break;
            };
            slot.set_phase(SyncPhase::PushingRemote);

            match self.remote.put(&aggregate).await {
                Ok(()) => {
                    slot.finish_push(Some(aggregate.updated_at), None);
                    tracing::debug!(character_id = %id, "Pushed character to remote");
                    self.events.emit(SyncEvent::PushSucceeded {
                        character_id: id.clone(),
                    });
                }
                Err(e @ RemoteError::Network(_)) => {
                    slot.finish_push(None, Some(e.to_string()));
                    tracing::debug!(character_id = %id, error = %e, "Push dropped, remote unreachable");
                    self.events.emit(SyncEvent::PushDeferred {
                        character_id: id.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e @ RemoteError::Rejected(_)) => {
                    slot.reject_push(e.to_string());
                    tracing::error!(character_id = %id, error = %e, "Remote rejected push; keeping local copy");
                    self.events.emit(SyncEvent::PushRejected {
                        character_id: id.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}
