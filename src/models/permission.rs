//! Environment permissions and the current viewer.

use serde::{Deserialize, Serialize};

/// Permission keys the change-request pages check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    ApproveChangeRequest,
    UpdateFeatureState,
}

impl Capability {
    /// Key as returned by the permissions endpoint.
    pub fn key(&self) -> &'static str {
        match self {
            Self::ApproveChangeRequest => "APPROVE_CHANGE_REQUEST",
            Self::UpdateFeatureState => "UPDATE_FEATURE_STATE",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Response of `GET /environments/{key}/my-permissions/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentPermissions {
    #[serde(default)]
    pub admin: bool,

    #[serde(default)]
    pub permissions: Vec<String>,
}

impl EnvironmentPermissions {
    /// Admins hold every capability.
    pub fn has(&self, capability: Capability) -> bool {
        self.admin || self.permissions.iter().any(|p| p == capability.key())
    }
}

/// The signed-in user looking at a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    pub user_id: i64,
    pub permissions: EnvironmentPermissions,
}

impl Viewer {
    pub fn new(user_id: i64, permissions: EnvironmentPermissions) -> Self {
        Self {
            user_id,
            permissions,
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.permissions.has(capability)
    }
}
