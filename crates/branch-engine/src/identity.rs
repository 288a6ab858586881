//! Identity provider boundary.
//!
//! Lookups that fail are treated as "unknown user" by the engine; only
//! forced logout reports an error, and the engine logs and drops it.

use serde::{Deserialize, Serialize};

/// What the identity provider knows about a person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Group membership, matched against branch prefixes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    pub id: String,
    pub name: String,
}

pub trait IdentityProvider: Send + Sync {
    fn user_info(&self, user_name: &str) -> Option<UserInfo>;

    fn branches_of_user(&self, user_name: &str) -> Vec<UserGroup>;

    fn is_user_in_role(&self, user_name: &str, role: &str) -> bool;

    /// Terminate the user's sessions
    fn force_logout(&self, user_id: &str, forced: bool, reason: &str) -> anyhow::Result<()>;
}

/// Provider that knows nobody
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIdentityProvider;

impl IdentityProvider for NoIdentityProvider {
    fn user_info(&self, _user_name: &str) -> Option<UserInfo> {
        None
    }

    fn branches_of_user(&self, _user_name: &str) -> Vec<UserGroup> {
        Vec::new()
    }

    fn is_user_in_role(&self, _user_name: &str, _role: &str) -> bool {
        false
    }

    fn force_logout(&self, _user_id: &str, _forced: bool, _reason: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
