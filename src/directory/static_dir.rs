//! Static Directory
//!
//! Users, tokens and grants declared in the configuration file.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{Directory, DirectoryError, Principal};

/// One user entry from `[[directory.users]]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticUser {
    /// Bearer token presented by this user
    pub token: String,
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub elevated: bool,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Granted device ids
    #[serde(default)]
    pub devices: Vec<String>,
}

fn default_active() -> bool {
    true
}

/// Directory backed by a fixed user list
pub struct StaticDirectory {
    by_token: HashMap<String, StaticUser>,
}

impl StaticDirectory {
    pub fn new(users: Vec<StaticUser>) -> Self {
        Self {
            by_token: users.into_iter().map(|u| (u.token.clone(), u)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn authenticate(&self, token: &str) -> Result<Principal, DirectoryError> {
        let user = self
            .by_token
            .get(token)
            .ok_or(DirectoryError::InvalidCredentials)?;
        Ok(Principal {
            user_id: user.id.clone(),
            email: user.email.clone(),
            active: user.active,
            elevated: user.elevated,
        })
    }

    async fn device_grants(&self, principal: &Principal) -> Result<Vec<String>, DirectoryError> {
        Ok(self
            .by_token
            .values()
            .find(|u| u.id == principal.user_id)
            .map(|u| u.devices.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_defaults() {
        let user: StaticUser = toml::from_str(
            r#"
            token = "t"
            id = "u1"
            "#,
        )
        .unwrap();
        assert!(user.active);
        assert!(!user.elevated);
        assert!(user.devices.is_empty());
    }

    #[tokio::test]
    async fn test_grants_for_principal() {
        let directory = StaticDirectory::new(vec![StaticUser {
            token: "t".into(),
            id: "u1".into(),
            email: String::new(),
            elevated: false,
            active: true,
            devices: vec!["north".into()],
        }]);

        let principal = directory.authenticate("t").await.unwrap();
        assert_eq!(principal.user_id, "u1");
        assert_eq!(directory.device_grants(&principal).await.unwrap(), vec!["north"]);
    }
}
