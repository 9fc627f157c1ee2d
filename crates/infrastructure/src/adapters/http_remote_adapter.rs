//! HTTP remote service adapter
//!
//! Maps the CRUD contract onto REST routes below a base URL:
//! `POST {base}/{type}`, `PUT|DELETE|GET {base}/{type}/{id}`.
//! Updates and deletes carry the queued base time in `If-Unmodified-Since`
//! (RFC 3339) unless forced; the service answers `409` or `412` with its
//! current copy when that precondition fails.

use std::time::Duration;

use application::ports::{RemoteEntity, RemoteError, RemoteOutcome, RemoteServicePort};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use domain::EntityType;
use reqwest::{Client, RequestBuilder, Response, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Remote service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the entity API (default: <http://localhost:8080/api>)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Optional bearer token
    #[serde(default, skip_serializing)]
    pub bearer_token: Option<SecretString>,
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

const fn default_timeout() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            bearer_token: None,
        }
    }
}

/// REST client for the remote entity service
#[derive(Debug)]
pub struct HttpRemoteAdapter {
    client: Client,
    base_url: String,
    bearer_token: Option<SecretString>,
}

impl HttpRemoteAdapter {
    /// Create a new adapter
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to initialize.
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RemoteError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: config.bearer_token.clone(),
        })
    }

    fn collection_url(&self, entity_type: &EntityType) -> String {
        format!("{}/{}", self.base_url, entity_type)
    }

    fn entity_url(&self, entity_type: &EntityType, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, entity_type, id)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    fn precondition(request: RequestBuilder, base: DateTime<Utc>, force: bool) -> RequestBuilder {
        if force {
            request
        } else {
            request.header(
                header::IF_UNMODIFIED_SINCE,
                base.to_rfc3339_opts(SecondsFormat::Nanos, true),
            )
        }
    }

    async fn send(request: RequestBuilder) -> Result<Response, RemoteError> {
        request.send().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Network(format!("Request timed out: {e}"))
            } else {
                RemoteError::Network(format!("Request failed: {e}"))
            }
        })
    }

    async fn entity(response: Response) -> Result<RemoteEntity, RemoteError> {
        response
            .json::<RemoteEntity>()
            .await
            .map_err(|e| RemoteError::Network(format!("Invalid entity in response: {e}")))
    }

    /// Current remote copy carried by a conflict response, if any
    async fn snapshot(response: Response) -> Option<RemoteEntity> {
        let body = response.bytes().await.ok()?;
        if body.is_empty() {
            return None;
        }
        match serde_json::from_slice::<RemoteEntity>(&body) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!(error = %e, "Conflict response without a usable snapshot");
                None
            },
        }
    }

    /// Errors shared by every route
    async fn failure(response: Response) -> RemoteError {
        let status = response.status();
        let message = response.text().await.unwrap_or_default();
        if status.is_server_error()
            || status == StatusCode::TOO_MANY_REQUESTS
            || status == StatusCode::REQUEST_TIMEOUT
        {
            RemoteError::Network(format!("HTTP {status}: {message}"))
        } else {
            RemoteError::Rejected {
                status: status.as_u16(),
                message,
            }
        }
    }

    const fn is_conflict(status: StatusCode) -> bool {
        matches!(
            status,
            StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED
        )
    }
}

#[async_trait]
impl RemoteServicePort for HttpRemoteAdapter {
    #[instrument(skip(self, payload), fields(entity_type = %entity_type))]
    async fn create(
        &self,
        entity_type: &EntityType,
        payload: &serde_json::Value,
    ) -> Result<RemoteOutcome, RemoteError> {
        let request = self.authorize(self.client.post(self.collection_url(entity_type)).json(payload));
        let response = Self::send(request).await?;
        let status = response.status();
        debug!(%status, "Create response");

        if status.is_success() {
            Ok(RemoteOutcome::Applied(Self::entity(response).await?))
        } else if Self::is_conflict(status) {
            Ok(RemoteOutcome::Conflict(Self::snapshot(response).await))
        } else {
            Err(Self::failure(response).await)
        }
    }

    #[instrument(skip(self, payload), fields(entity_type = %entity_type))]
    async fn update(
        &self,
        entity_type: &EntityType,
        id: &str,
        payload: &serde_json::Value,
        base: DateTime<Utc>,
        force: bool,
    ) -> Result<RemoteOutcome, RemoteError> {
        let request = self.client.put(self.entity_url(entity_type, id)).json(payload);
        let request = self.authorize(Self::precondition(request, base, force));
        let response = Self::send(request).await?;
        let status = response.status();
        debug!(%status, "Update response");

        if status.is_success() {
            Ok(RemoteOutcome::Applied(Self::entity(response).await?))
        } else if Self::is_conflict(status) {
            Ok(RemoteOutcome::Conflict(Self::snapshot(response).await))
        } else if status == StatusCode::NOT_FOUND {
            // Deleted remotely while the update was queued
            Ok(RemoteOutcome::Conflict(None))
        } else {
            Err(Self::failure(response).await)
        }
    }

    #[instrument(skip(self), fields(entity_type = %entity_type))]
    async fn delete(
        &self,
        entity_type: &EntityType,
        id: &str,
        base: DateTime<Utc>,
        force: bool,
    ) -> Result<RemoteOutcome, RemoteError> {
        let request = self.client.delete(self.entity_url(entity_type, id));
        let request = self.authorize(Self::precondition(request, base, force));
        let response = Self::send(request).await?;
        let status = response.status();
        debug!(%status, "Delete response");

        if status.is_success() || status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            Ok(RemoteOutcome::Deleted)
        } else if Self::is_conflict(status) {
            Ok(RemoteOutcome::Conflict(Self::snapshot(response).await))
        } else {
            Err(Self::failure(response).await)
        }
    }

    #[instrument(skip(self), fields(entity_type = %entity_type))]
    async fn fetch(
        &self,
        entity_type: &EntityType,
        id: &str,
    ) -> Result<Option<RemoteEntity>, RemoteError> {
        let request = self.authorize(self.client.get(self.entity_url(entity_type, id)));
        let response = Self::send(request).await?;
        let status = response.status();

        if status.is_success() {
            Ok(Some(Self::entity(response).await?))
        } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            Ok(None)
        } else {
            Err(Self::failure(response).await)
        }
    }
}
