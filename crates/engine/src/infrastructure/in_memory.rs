//! In-memory adapters for the local cache and the remote store.
//!
//! The remote fake can be taken offline, told to reject writes, and made to
//! hold combat-action creates open, which is what the ordering tests need.
//! Character reads and writes can be slowed down so that callers overlap.
//! Every call it receives is appended to a log before it does any work.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, Semaphore};
use uuid::Uuid;

use herosheet_domain::{
    CharacterAggregate, CharacterDraft, CharacterId, CombatActionCollection, CombatActionData,
    RemoteId,
};

use crate::infrastructure::ports::{
    ClockPort, LocalCache, LocalStorageError, RemoteError, RemoteStore,
};

// =============================================================================
// Local cache
// =============================================================================

pub struct InMemoryLocalCache {
    characters: RwLock<HashMap<CharacterId, CharacterAggregate>>,
    actions: RwLock<HashMap<CharacterId, CombatActionCollection>>,
    clock: Arc<dyn ClockPort>,
    fail_writes: AtomicBool,
}

impl InMemoryLocalCache {
    pub fn new(clock: Arc<dyn ClockPort>) -> Self {
        Self {
            characters: RwLock::new(HashMap::new()),
            actions: RwLock::new(HashMap::new()),
            clock,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes every subsequent write fail, as a full or read-only disk would.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self, operation: &'static str) -> Result<(), LocalStorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(LocalStorageError::database(operation, "storage is read-only"));
        }
        Ok(())
    }
}

#[async_trait]
impl LocalCache for InMemoryLocalCache {
    async fn get(&self, id: &CharacterId) -> Result<Option<CharacterAggregate>, LocalStorageError> {
        Ok(self.characters.read().await.get(id).cloned())
    }

    async fn put(
        &self,
        mut aggregate: CharacterAggregate,
    ) -> Result<CharacterAggregate, LocalStorageError> {
        self.check_writable("put")?;
        aggregate.updated_at = self.clock.now();
        self.characters
            .write()
            .await
            .insert(aggregate.id.clone(), aggregate.clone());
        Ok(aggregate)
    }

    async fn delete(&self, id: &CharacterId) -> Result<(), LocalStorageError> {
        self.check_writable("delete")?;
        self.characters.write().await.remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<CharacterId>, LocalStorageError> {
        let mut ids: Vec<CharacterId> = self.characters.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn get_actions(
        &self,
        parent_id: &CharacterId,
    ) -> Result<CombatActionCollection, LocalStorageError> {
        Ok(self
            .actions
            .read()
            .await
            .get(parent_id)
            .cloned()
            .unwrap_or_else(|| CombatActionCollection::new(parent_id.clone())))
    }

    async fn put_actions(&self, actions: &CombatActionCollection) -> Result<(), LocalStorageError> {
        self.check_writable("put_actions")?;
        self.actions
            .write()
            .await
            .insert(actions.parent_id().clone(), actions.clone());
        Ok(())
    }

    async fn delete_actions(&self, parent_id: &CharacterId) -> Result<(), LocalStorageError> {
        self.check_writable("delete_actions")?;
        self.actions.write().await.remove(parent_id);
        Ok(())
    }
}

// =============================================================================
// Remote store
// =============================================================================

/// One received call, recorded in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Create(String),
    Get(CharacterId),
    Put(CharacterId),
    Delete(CharacterId),
    CreateAction(CharacterId, String),
    UpdateAction(CharacterId, RemoteId),
    DeleteAction(CharacterId, RemoteId),
}

/// Holds combat-action creates open until released.
pub struct CreateGate {
    semaphore: Arc<Semaphore>,
}

impl CreateGate {
    /// Lets every held and future create through.
    pub fn release(&self) {
        self.semaphore.close();
    }
}

pub struct InMemoryRemoteStore {
    characters: RwLock<HashMap<CharacterId, CharacterAggregate>>,
    actions: RwLock<HashMap<RemoteId, (CharacterId, CombatActionData)>>,
    calls: Mutex<Vec<RemoteCall>>,
    offline: AtomicBool,
    reject_writes: AtomicBool,
    create_gate: Mutex<Option<Arc<Semaphore>>>,
    puts_in_flight: AtomicUsize,
    max_puts_in_flight: AtomicUsize,
    latency_ms: AtomicU64,
    character_calls_in_flight: AtomicUsize,
    max_character_calls_in_flight: AtomicUsize,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            characters: RwLock::new(HashMap::new()),
            actions: RwLock::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
            reject_writes: AtomicBool::new(false),
            create_gate: Mutex::new(None),
            puts_in_flight: AtomicUsize::new(0),
            max_puts_in_flight: AtomicUsize::new(0),
            latency_ms: AtomicU64::new(0),
            character_calls_in_flight: AtomicUsize::new(0),
            max_character_calls_in_flight: AtomicUsize::new(0),
        }
    }

    /// Seeds a character as-is, without touching its timestamp.
    pub async fn insert(&self, aggregate: CharacterAggregate) {
        self.characters
            .write()
            .await
            .insert(aggregate.id.clone(), aggregate);
    }

    pub async fn character(&self, id: &CharacterId) -> Option<CharacterAggregate> {
        self.characters.read().await.get(id).cloned()
    }

    pub async fn action(&self, remote_id: &RemoteId) -> Option<CombatActionData> {
        self.actions
            .read()
            .await
            .get(remote_id)
            .map(|(_, data)| data.clone())
    }

    pub async fn action_count(&self) -> usize {
        self.actions.read().await.len()
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Holds every combat-action create until the returned gate is released.
    pub fn hold_action_creates(&self) -> CreateGate {
        let semaphore = Arc::new(Semaphore::new(0));
        *self
            .create_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(semaphore.clone());
        CreateGate { semaphore }
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of `put` calls received for one character.
    pub fn put_count(&self, id: &CharacterId) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::Put(put_id) if put_id == id))
            .count()
    }

    /// Highest number of `put` calls ever running at the same time.
    pub fn max_puts_in_flight(&self) -> usize {
        self.max_puts_in_flight.load(Ordering::SeqCst)
    }

    /// Number of `get` calls received for one character.
    pub fn get_count(&self, id: &CharacterId) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::Get(get_id) if get_id == id))
            .count()
    }

    /// Makes every character `get` and `put` take at least `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Highest number of character `get` and `put` calls ever running at the
    /// same time.
    pub fn max_character_calls_in_flight(&self) -> usize {
        self.max_character_calls_in_flight.load(Ordering::SeqCst)
    }

    async fn character_call<T>(&self, call: impl std::future::Future<Output = T>) -> T {
        let running = self.character_calls_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_character_calls_in_flight
            .fetch_max(running, Ordering::SeqCst);
        match self.latency_ms.load(Ordering::SeqCst) {
            0 => tokio::task::yield_now().await,
            millis => tokio::time::sleep(Duration::from_millis(millis)).await,
        }
        let result = call.await;
        self.character_calls_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn record(&self, call: RemoteCall) -> Result<(), RemoteError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::network("remote store is offline"));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), RemoteError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::rejected("write refused by backend"));
        }
        Ok(())
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn create(&self, draft: &CharacterDraft) -> Result<CharacterAggregate, RemoteError> {
        self.record(RemoteCall::Create(draft.name.clone()))?;
        self.check_write()?;
        let id = CharacterId::new(Uuid::new_v4().to_string());
        let aggregate = CharacterAggregate::from_draft(id, draft.clone(), chrono::Utc::now());
        self.insert(aggregate.clone()).await;
        Ok(aggregate)
    }

    async fn get(&self, id: &CharacterId) -> Result<Option<CharacterAggregate>, RemoteError> {
        self.record(RemoteCall::Get(id.clone()))?;
        Ok(self.character_call(self.character(id)).await)
    }

    async fn put(&self, aggregate: &CharacterAggregate) -> Result<(), RemoteError> {
        self.record(RemoteCall::Put(aggregate.id.clone()))?;
        self.check_write()?;

        let running = self.puts_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_puts_in_flight.fetch_max(running, Ordering::SeqCst);
        self.character_call(self.insert(aggregate.clone())).await;
        self.puts_in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, id: &CharacterId) -> Result<(), RemoteError> {
        self.record(RemoteCall::Delete(id.clone()))?;
        self.check_write()?;
        self.characters.write().await.remove(id);
        self.actions
            .write()
            .await
            .retain(|_, (parent, _)| parent != id);
        Ok(())
    }

    async fn create_action(
        &self,
        parent_id: &CharacterId,
        data: &CombatActionData,
    ) -> Result<RemoteId, RemoteError> {
        self.record(RemoteCall::CreateAction(parent_id.clone(), data.name.clone()))?;

        let gate = self
            .create_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(gate) = gate {
            // A closed semaphore means the gate was released.
            let _ = gate.acquire().await;
        }

        self.check_write()?;
        let remote_id = RemoteId::new(Uuid::new_v4().to_string());
        self.actions
            .write()
            .await
            .insert(remote_id.clone(), (parent_id.clone(), data.clone()));
        Ok(remote_id)
    }

    async fn update_action(
        &self,
        parent_id: &CharacterId,
        remote_id: &RemoteId,
        data: &CombatActionData,
    ) -> Result<(), RemoteError> {
        self.record(RemoteCall::UpdateAction(parent_id.clone(), remote_id.clone()))?;
        self.check_write()?;
        let mut actions = self.actions.write().await;
        match actions.get_mut(remote_id) {
            Some(entry) => {
                entry.1 = data.clone();
                Ok(())
            }
            None => Err(RemoteError::rejected(format!(
                "unknown combat action {remote_id}"
            ))),
        }
    }

    async fn delete_action(
        &self,
        parent_id: &CharacterId,
        remote_id: &RemoteId,
    ) -> Result<(), RemoteError> {
        self.record(RemoteCall::DeleteAction(parent_id.clone(), remote_id.clone()))?;
        self.check_write()?;
        self.actions.write().await.remove(remote_id);
        Ok(())
    }
}
