//! Remote store wrapper that bounds every call with a timeout.
//!
//! Wraps any `RemoteStore` implementation. A call that exceeds the limit is
//! reported as `RemoteError::Network`, the same as an unreachable backend.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use herosheet_domain::{
    CharacterAggregate, CharacterDraft, CharacterId, CombatActionData, RemoteId,
};

use crate::infrastructure::ports::{RemoteError, RemoteStore};

/// Default bound for a single remote call.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(5);

/// Wrapper that adds a timeout to any remote store
pub struct TimeoutRemoteStore {
    inner: Arc<dyn RemoteStore>,
    timeout: Duration,
}

impl TimeoutRemoteStore {
    pub fn new(inner: Arc<dyn RemoteStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, operation: &'static str, call: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!(
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Remote call timed out"
                );
                Err(RemoteError::network(format!(
                    "{operation} timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }
}

#[async_trait]
impl RemoteStore for TimeoutRemoteStore {
    async fn create(&self, draft: &CharacterDraft) -> Result<CharacterAggregate, RemoteError> {
        self.bounded("create", self.inner.create(draft)).await
    }

    async fn get(&self, id: &CharacterId) -> Result<Option<CharacterAggregate>, RemoteError> {
        self.bounded("get", self.inner.get(id)).await
    }

    async fn put(&self, aggregate: &CharacterAggregate) -> Result<(), RemoteError> {
        self.bounded("put", self.inner.put(aggregate)).await
    }

    async fn delete(&self, id: &CharacterId) -> Result<(), RemoteError> {
        self.bounded("delete", self.inner.delete(id)).await
    }

    async fn create_action(
        &self,
        parent_id: &CharacterId,
        data: &CombatActionData,
    ) -> Result<RemoteId, RemoteError> {
        self.bounded("create_action", self.inner.create_action(parent_id, data))
            .await
    }

    async fn update_action(
        &self,
        parent_id: &CharacterId,
        remote_id: &RemoteId,
        data: &CombatActionData,
    ) -> Result<(), RemoteError> {
        self.bounded(
            "update_action",
            self.inner.update_action(parent_id, remote_id, data),
        )
        .await
    }

    async fn delete_action(
        &self,
        parent_id: &CharacterId,
        remote_id: &RemoteId,
    ) -> Result<(), RemoteError> {
        self.bounded("delete_action", self.inner.delete_action(parent_id, remote_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::InMemoryRemoteStore;
    use crate::infrastructure::ports::MockRemoteStore;

    /// Remote that never answers.
    struct Hanging;

    #[async_trait]
    impl RemoteStore for Hanging {
        async fn create(&self, _: &CharacterDraft) -> Result<CharacterAggregate, RemoteError> {
            std::future::pending().await
        }
        async fn get(&self, _: &CharacterId) -> Result<Option<CharacterAggregate>, RemoteError> {
            std::future::pending().await
        }
        async fn put(&self, _: &CharacterAggregate) -> Result<(), RemoteError> {
            std::future::pending().await
        }
        async fn delete(&self, _: &CharacterId) -> Result<(), RemoteError> {
            std::future::pending().await
        }
        async fn create_action(
            &self,
            _: &CharacterId,
            _: &CombatActionData,
        ) -> Result<RemoteId, RemoteError> {
            std::future::pending().await
        }
        async fn update_action(
            &self,
            _: &CharacterId,
            _: &RemoteId,
            _: &CombatActionData,
        ) -> Result<(), RemoteError> {
            std::future::pending().await
        }
        async fn delete_action(&self, _: &CharacterId, _: &RemoteId) -> Result<(), RemoteError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn hanging_call_becomes_network_error() {
        let remote = TimeoutRemoteStore::new(Arc::new(Hanging), Duration::from_millis(20));

        let err = remote
            .get(&CharacterId::new("c1"))
            .await
            .expect_err("must time out");

        assert!(err.is_retryable());
        assert!(err.to_string().contains("get timed out"));
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let inner = Arc::new(InMemoryRemoteStore::new());
        let remote = TimeoutRemoteStore::new(inner, Duration::from_secs(1));

        let created = remote
            .create(&CharacterDraft::new("Eberk"))
            .await
            .expect("create");
        let fetched = remote.get(&created.id).await.expect("get");

        assert_eq!(fetched, Some(created));
    }

    #[tokio::test]
    async fn rejections_are_not_rewritten() {
        let mut inner = MockRemoteStore::new();
        inner
            .expect_delete()
            .returning(|_| Err(RemoteError::rejected("forbidden")));
        let remote = TimeoutRemoteStore::new(Arc::new(inner), Duration::from_secs(1));

        let err = remote
            .delete(&CharacterId::new("c1"))
            .await
            .expect_err("rejected");

        assert_eq!(err, RemoteError::rejected("forbidden"));
    }
}
