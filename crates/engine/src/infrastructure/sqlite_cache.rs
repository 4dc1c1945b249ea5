//! SQLite-backed local cache.
//!
//! Aggregates and combat-action collections are stored as opaque JSON bodies;
//! the cache enforces no schema beyond the key columns.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use herosheet_domain::{CharacterAggregate, CharacterId, CombatActionCollection};

use crate::infrastructure::ports::{ClockPort, LocalCache, LocalStorageError};

/// SQLite implementation of the local cache.
pub struct SqliteLocalCache {
    pool: SqlitePool,
    clock: Arc<dyn ClockPort>,
}

impl SqliteLocalCache {
    pub async fn new(db_path: &str, clock: Arc<dyn ClockPort>) -> Result<Self, LocalStorageError> {
        let pool = SqlitePool::connect(&format!("sqlite:{}?mode=rwc", db_path))
            .await
            .map_err(|e| LocalStorageError::database("open", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS characters (
                id TEXT PRIMARY KEY NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| LocalStorageError::database("migrate", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS combat_actions (
                parent_id TEXT PRIMARY KEY NOT NULL,
                body TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| LocalStorageError::database("migrate", e))?;

        Ok(Self { pool, clock })
    }
}

#[async_trait]
impl LocalCache for SqliteLocalCache {
    async fn get(&self, id: &CharacterId) -> Result<Option<CharacterAggregate>, LocalStorageError> {
        let row = sqlx::query("SELECT body FROM characters WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LocalStorageError::database("get", e))?;

        match row {
            Some(row) => {
                let json: String = row.get("body");
                let aggregate =
                    serde_json::from_str(&json).map_err(LocalStorageError::serialization)?;
                Ok(Some(aggregate))
            }
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        mut aggregate: CharacterAggregate,
    ) -> Result<CharacterAggregate, LocalStorageError> {
        aggregate.updated_at = self.clock.now();
        let json = serde_json::to_string(&aggregate).map_err(LocalStorageError::serialization)?;

        sqlx::query(
            r#"
            INSERT INTO characters (id, body, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(aggregate.id.as_str())
        .bind(json)
        .bind(aggregate.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| LocalStorageError::database("put", e))?;

        Ok(aggregate)
    }

    async fn delete(&self, id: &CharacterId) -> Result<(), LocalStorageError> {
        sqlx::query("DELETE FROM characters WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| LocalStorageError::database("delete", e))?;
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<CharacterId>, LocalStorageError> {
        let rows = sqlx::query("SELECT id FROM characters ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| LocalStorageError::database("list_ids", e))?;

        Ok(rows
            .iter()
            .map(|row| CharacterId::new(row.get::<String, _>("id")))
            .collect())
    }

    async fn get_actions(
        &self,
        parent_id: &CharacterId,
    ) -> Result<CombatActionCollection, LocalStorageError> {
        let row = sqlx::query("SELECT body FROM combat_actions WHERE parent_id = ?")
            .bind(parent_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LocalStorageError::database("get_actions", e))?;

        match row {
            Some(row) => {
                let json: String = row.get("body");
                serde_json::from_str(&json).map_err(LocalStorageError::serialization)
            }
            None => Ok(CombatActionCollection::new(parent_id.clone())),
        }
    }

    async fn put_actions(&self, actions: &CombatActionCollection) -> Result<(), LocalStorageError> {
        let json = serde_json::to_string(actions).map_err(LocalStorageError::serialization)?;

        sqlx::query(
            r#"
            INSERT INTO combat_actions (parent_id, body)
            VALUES (?, ?)
            ON CONFLICT(parent_id) DO UPDATE SET body = excluded.body
            "#,
        )
        .bind(actions.parent_id().as_str())
        .bind(json)
        .execute(&self.pool)
        .await
        .map_err(|e| LocalStorageError::database("put_actions", e))?;

        Ok(())
    }

    async fn delete_actions(&self, parent_id: &CharacterId) -> Result<(), LocalStorageError> {
        sqlx::query("DELETE FROM combat_actions WHERE parent_id = ?")
            .bind(parent_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| LocalStorageError::database("delete_actions", e))?;
        Ok(())
    }
}
