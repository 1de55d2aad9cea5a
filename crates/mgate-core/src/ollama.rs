//! HTTP client for an Ollama-compatible model server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::backend::{InstalledModels, ModelBackend};
use crate::config::GateConfig;
use crate::error::BackendError;
use crate::pull::PullEvents;
use crate::transport::{bounded, build_client, cancellable, read_prefix, ERROR_BODY_LIMIT};

const TAGS_PATH: &str = "/api/tags";
const PULL_PATH: &str = "/api/pull";

#[derive(Debug, Default, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Option<Vec<TagEntry>>,
}

#[derive(Debug, Default, Deserialize)]
struct TagEntry {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

impl TagEntry {
    fn into_identifier(self) -> Option<String> {
        self.name
            .filter(|n| !n.is_empty())
            .or(self.model.filter(|m| !m.is_empty()))
    }
}

#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &GateConfig) -> Result<Self, BackendError> {
        Self::from_parts(config.base_url.clone(), config.request_timeout)
    }

    pub fn from_parts(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            client: build_client(timeout)?,
            base_url,
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_tags(&self, cancel: &CancellationToken) -> Result<Response, BackendError> {
        let request = self
            .client
            .get(self.url(TAGS_PATH))
            .timeout(self.timeout)
            .send();
        cancellable(cancel, async { request.await.map_err(BackendError::from) }).await
    }
}

#[async_trait]
impl ModelBackend for OllamaBackend {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn probe(&self, cancel: &CancellationToken) -> Result<(), BackendError> {
        let response = self.get_tags(cancel).await?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(BackendError::Status {
                status,
                body: String::new(),
            });
        }
        Ok(())
    }

    async fn installed_models(
        &self,
        cancel: &CancellationToken,
    ) -> Result<InstalledModels, BackendError> {
        let response = self.get_tags(cancel).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                status,
                body: String::new(),
            });
        }
        let body = cancellable(cancel, async {
            response.bytes().await.map_err(BackendError::from)
        })
        .await?;
        let tags: TagsResponse = serde_json::from_slice(&body)?;
        Ok(tags
            .models
            .unwrap_or_default()
            .into_iter()
            .filter_map(TagEntry::into_identifier)
            .collect())
    }

    async fn pull(&self, model: &str, cancel: &CancellationToken) -> Result<(), BackendError> {
        let request = self
            .client
            .post(self.url(PULL_PATH))
            .json(&json!({ "name": model }))
            .send();
        let response = bounded(self.timeout, cancel, async {
            request.await.map_err(BackendError::from)
        })
        .await?;
        let status = response.status();
        if !status.is_success() {
            let body = read_prefix(response, ERROR_BODY_LIMIT, self.timeout, cancel).await;
            return Err(BackendError::Status { status, body });
        }
        PullEvents::new(response.bytes_stream(), self.timeout, cancel.clone())
            .drive(model)
            .await
    }
}
