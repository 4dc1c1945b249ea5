//! Storage port traits: the local cache and the remote store.

use async_trait::async_trait;
use herosheet_domain::{
    CharacterAggregate, CharacterDraft, CharacterId, CombatActionCollection, CombatActionData,
    RemoteId,
};

use super::error::{LocalStorageError, RemoteError};

// =============================================================================
// Local Cache
// =============================================================================

/// Durable, process-local store of last-known-good snapshots.
///
/// Writes overwrite wholesale; merging is the conflict resolver's job.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocalCache: Send + Sync {
    async fn get(&self, id: &CharacterId) -> Result<Option<CharacterAggregate>, LocalStorageError>;

    /// Stores the aggregate, stamping `updated_at` with the local clock.
    ///
    /// Returns the aggregate exactly as stored.
    async fn put(
        &self,
        aggregate: CharacterAggregate,
    ) -> Result<CharacterAggregate, LocalStorageError>;

    async fn delete(&self, id: &CharacterId) -> Result<(), LocalStorageError>;

    async fn list_ids(&self) -> Result<Vec<CharacterId>, LocalStorageError>;

    // Combat actions (one collection per character)
    async fn get_actions(
        &self,
        parent_id: &CharacterId,
    ) -> Result<CombatActionCollection, LocalStorageError>;
    async fn put_actions(&self, actions: &CombatActionCollection) -> Result<(), LocalStorageError>;
    async fn delete_actions(&self, parent_id: &CharacterId) -> Result<(), LocalStorageError>;
}

// =============================================================================
// Remote Store
// =============================================================================

/// Client stub for the authoritative backend.
///
/// Every call may fail with [`RemoteError::Network`] or
/// [`RemoteError::Rejected`]. Updates and deletes are idempotent by id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates a character; the backend assigns its id.
    async fn create(&self, draft: &CharacterDraft) -> Result<CharacterAggregate, RemoteError>;

    /// `None` if the backend has never seen this character.
    async fn get(&self, id: &CharacterId) -> Result<Option<CharacterAggregate>, RemoteError>;

    async fn put(&self, aggregate: &CharacterAggregate) -> Result<(), RemoteError>;

    async fn delete(&self, id: &CharacterId) -> Result<(), RemoteError>;

    // Combat actions
    async fn create_action(
        &self,
        parent_id: &CharacterId,
        data: &CombatActionData,
    ) -> Result<RemoteId, RemoteError>;
    async fn update_action(
        &self,
        parent_id: &CharacterId,
        remote_id: &RemoteId,
        data: &CombatActionData,
    ) -> Result<(), RemoteError>;
    async fn delete_action(
        &self,
        parent_id: &CharacterId,
        remote_id: &RemoteId,
    ) -> Result<(), RemoteError>;
}
