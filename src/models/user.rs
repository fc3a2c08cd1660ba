//! Organisation users and groups.

use serde::{Deserialize, Serialize};

/// A member of the organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationUser {
    pub id: i64,

    pub email: String,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,
}

impl OrganisationUser {
    /// "First Last", falling back to the email address.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}

/// A permission group of the organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroup {
    pub id: i64,

    pub name: String,

    #[serde(default)]
    pub users: Vec<OrganisationUser>,
}

impl UserGroup {
    pub fn has_member(&self, user_id: i64) -> bool {
        self.users.iter().any(|u| u.id == user_id)
    }
}
