//! HTTP Directory Client
//!
//! Client for an external identity service. The user's own token resolves
//! the principal (`GET {base}/me`); grants are read with the hub's service
//! token (`GET {base}/users/{id}/parks`).

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Directory, DirectoryError, Principal};

/// Configuration for the HTTP directory client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpDirectoryConfig {
    /// Base URL of the identity service (e.g., "http://localhost:8000")
    pub base_url: String,
    /// Token the hub uses to read other users' grants
    #[serde(default)]
    pub service_token: String,
    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for HttpDirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            service_token: String::new(),
            request_timeout_ms: default_timeout_ms(),
        }
    }
}

/// A grant as listed by the identity service
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GrantEntry {
    Id(String),
    Park { id: String },
}

impl GrantEntry {
    fn into_id(self) -> String {
        match self {
            GrantEntry::Id(id) | GrantEntry::Park { id } => id,
        }
    }
}

/// Directory backed by a remote identity service
pub struct HttpDirectory {
    client: Client,
    config: HttpDirectoryConfig,
}

impl HttpDirectory {
    pub fn new(config: HttpDirectoryConfig) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &HttpDirectoryConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, DirectoryError> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DirectoryError::Timeout
            } else if e.is_connect() {
                DirectoryError::Unavailable(e.to_string())
            } else {
                DirectoryError::Request(e)
            }
        })?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(DirectoryError::InvalidCredentials)
            }
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(DirectoryError::Api {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl Directory for HttpDirectory {
    async fn authenticate(&self, token: &str) -> Result<Principal, DirectoryError> {
        let request = self.client.get(self.url("/me")).bearer_auth(token);
        self.fetch(request).await
    }

    async fn device_grants(&self, principal: &Principal) -> Result<Vec<String>, DirectoryError> {
        let path = format!("/users/{}/parks", principal.user_id);
        let request = self
            .client
            .get(self.url(&path))
            .bearer_auth(&self.config.service_token);
        let grants: Vec<GrantEntry> = self.fetch(request).await?;
        Ok(grants.into_iter().map(GrantEntry::into_id).collect())
    }
}
