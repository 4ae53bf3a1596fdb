//! External profile directory used by the maintenance workflow

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An account whose public profile data is refreshed periodically
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRef {
    pub id: String,
    #[serde(default)]
    pub handle: Option<String>,
}

impl AccountRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            handle: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProfileError {
    #[error("account listing failed: {0}")]
    Listing(String),

    #[error("refresh of account {account} failed: {reason}")]
    Refresh { account: String, reason: String },
}

#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<AccountRef>, ProfileError>;

    async fn refresh_profile(&self, account: &AccountRef) -> Result<(), ProfileError>;
}

/// A directory with no accounts
#[derive(Debug, Default, Clone)]
pub struct NoopProfileDirectory;

#[async_trait]
impl ProfileDirectory for NoopProfileDirectory {
    async fn list_accounts(&self) -> Result<Vec<AccountRef>, ProfileError> {
        Ok(Vec::new())
    }

    async fn refresh_profile(&self, _account: &AccountRef) -> Result<(), ProfileError> {
        Ok(())
    }
}
