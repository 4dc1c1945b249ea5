//! HTTP/JSON client for the authoritative backend.
//!
//! Routes:
//! - `POST   {base}/characters`
//! - `GET    {base}/characters/{id}` (404 means "not created remotely yet")
//! - `PUT    {base}/characters/{id}`
//! - `DELETE {base}/characters/{id}`
//! - `POST   {base}/characters/{id}/actions` -> `{ "id": "..." }`
//! - `PUT    {base}/characters/{id}/actions/{remote_id}`
//! - `DELETE {base}/characters/{id}/actions/{remote_id}`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;

use herosheet_domain::{
    CharacterAggregate, CharacterDraft, CharacterId, CombatActionData, RemoteId,
};

use crate::infrastructure::ports::{RemoteError, RemoteStore};

#[derive(Debug, Deserialize)]
struct CreatedAction {
    id: String,
}

pub struct HttpRemoteStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemoteStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn character_url(&self, id: &CharacterId) -> String {
        format!("{}/characters/{}", self.base_url, id)
    }

    fn actions_url(&self, parent_id: &CharacterId) -> String {
        format!("{}/actions", self.character_url(parent_id))
    }

    fn action_url(&self, parent_id: &CharacterId, remote_id: &RemoteId) -> String {
        format!("{}/{}", self.actions_url(parent_id), remote_id)
    }

    /// Turns a non-success response into the matching error.
    async fn check(response: Response) -> Result<Response, RemoteError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

/// 4xx is the backend refusing the request, except for the timeout and
/// backpressure codes. Anything else is treated as a transient failure worth
/// trying again later.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> RemoteError {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };
    let transient = matches!(
        status,
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
    );
    if status.is_client_error() && !transient {
        RemoteError::Rejected(message)
    } else {
        RemoteError::Network(message)
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_decode() {
        RemoteError::rejected(format!("malformed response: {e}"))
    } else {
        RemoteError::network(e)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn create(&self, draft: &CharacterDraft) -> Result<CharacterAggregate, RemoteError> {
        let response = self
            .client
            .post(format!("{}/characters", self.base_url))
            .json(draft)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)
    }

    async fn get(&self, id: &CharacterId) -> Result<Option<CharacterAggregate>, RemoteError> {
        let response = self
            .client
            .get(self.character_url(id))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::check(response)
            .await?
            .json()
            .await
            .map(Some)
            .map_err(transport_error)
    }

    async fn put(&self, aggregate: &CharacterAggregate) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.character_url(&aggregate.id))
            .json(aggregate)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete(&self, id: &CharacterId) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.character_url(id))
            .send()
            .await
            .map_err(transport_error)?;
        // Already gone counts as deleted.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }

    async fn create_action(
        &self,
        parent_id: &CharacterId,
        data: &CombatActionData,
    ) -> Result<RemoteId, RemoteError> {
        let response = self
            .client
            .post(self.actions_url(parent_id))
            .json(data)
            .send()
            .await
            .map_err(transport_error)?;
        let created: CreatedAction = Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;
        Ok(RemoteId::new(created.id))
    }

    async fn update_action(
        &self,
        parent_id: &CharacterId,
        remote_id: &RemoteId,
        data: &CombatActionData,
    ) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.action_url(parent_id, remote_id))
            .json(data)
            .send()
            .await
            .map_err(transport_error)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_action(
        &self,
        parent_id: &CharacterId,
        remote_id: &RemoteId,
    ) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.action_url(parent_id, remote_id))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response).await?;
        Ok(())
    }
}
