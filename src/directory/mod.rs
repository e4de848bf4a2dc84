//! Identity Directory
//!
//! Who a bearer token belongs to and which devices that user may see. The
//! hub only consumes identities and grants; issuing credentials and editing
//! grants belong to an external service reached through [`Directory`].

mod http;
mod static_dir;

pub use http::{HttpDirectory, HttpDirectoryConfig};
pub use static_dir::{StaticDirectory, StaticUser};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::device::DeviceDescriptor;

/// An authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(rename = "id")]
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(rename = "is_active", default = "default_active")]
    pub active: bool,
    /// Elevated users see every device and may write
    #[serde(rename = "is_superuser", default)]
    pub elevated: bool,
}

fn default_active() -> bool {
    true
}

/// The set of device endpoints a subscriber may see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    Unrestricted,
    /// Only these endpoint addresses; an empty set sees nothing
    Restricted(HashSet<String>),
}

impl Visibility {
    pub fn none() -> Self {
        Visibility::Restricted(HashSet::new())
    }

    pub fn allows(&self, url: &str) -> bool {
        match self {
            Visibility::Unrestricted => true,
            Visibility::Restricted(urls) => urls.contains(url),
        }
    }
}

/// Source of identities and device grants
#[async_trait]
pub trait Directory: Send + Sync {
    /// Resolve a bearer token to a principal
    async fn authenticate(&self, token: &str) -> Result<Principal, DirectoryError>;

    /// Device ids granted to a principal
    async fn device_grants(&self, principal: &Principal) -> Result<Vec<String>, DirectoryError>;
}

/// Errors that can occur while consulting the directory
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is inactive")]
    Inactive,

    #[error("directory unavailable: {0}")]
    Unavailable(String),

    #[error("directory request timed out")]
    Timeout,

    #[error("directory returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Turns principals into visibility sets over the configured devices
pub struct VisibilityResolver {
    directory: Arc<dyn Directory>,
    urls_by_id: HashMap<String, String>,
}

impl VisibilityResolver {
    pub fn new(directory: Arc<dyn Directory>, devices: &[DeviceDescriptor]) -> Self {
        Self {
            directory,
            urls_by_id: devices
                .iter()
                .map(|d| (d.id.clone(), d.url.clone()))
                .collect(),
        }
    }

    /// Authenticate a token, refusing inactive accounts
    pub async fn authenticate(&self, token: &str) -> Result<Principal, DirectoryError> {
        let principal = self.directory.authenticate(token).await?;
        if !principal.active {
            return Err(DirectoryError::Inactive);
        }
        Ok(principal)
    }

    /// Visibility of `principal`; directory failures yield no access
    pub async fn visibility(&self, principal: &Principal) -> Visibility {
        if principal.elevated {
            return Visibility::Unrestricted;
        }

        match self.directory.device_grants(principal).await {
            Ok(grants) => Visibility::Restricted(
                grants
                    .iter()
                    .filter_map(|id| self.urls_by_id.get(id).cloned())
                    .collect(),
            ),
            Err(e) => {
                tracing::error!(user_id = %principal.user_id, error = %e, "Grant lookup failed");
                Visibility::none()
            }
        }
    }
}
