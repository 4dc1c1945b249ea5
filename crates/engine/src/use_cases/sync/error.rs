//! Errors surfaced by the sync use cases.

use herosheet_domain::{CharacterId, DomainError};

use crate::infrastructure::ports::{LocalStorageError, RemoteError};

/// Failure of a foreground sync operation.
///
/// Remote failures only reach the caller on `create_character`, the one path
/// where the remote store is written before the cache. Everywhere else they
/// are absorbed by background tasks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The local cache could not be read or written; the mutation was not applied.
    #[error("Local storage failed: {0}")]
    LocalStorage(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Character {0} is not in the local cache")]
    NotCached(CharacterId),

    #[error("Combat action {0} not found")]
    SubRecordNotFound(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<LocalStorageError> for SyncError {
    fn from(err: LocalStorageError) -> Self {
        Self::LocalStorage(err.to_string())
    }
}
