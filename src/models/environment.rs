//! Environment model.

use serde::{Deserialize, Serialize};

/// An environment of a project (e.g. "Production").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub id: i64,

    /// Client-side key; also used to address the environment in API paths.
    pub api_key: String,

    pub name: String,

    /// Parent project ID.
    pub project: i64,

    /// Approvals needed before publishing. `None` means change requests are
    /// not enabled for this environment.
    #[serde(default)]
    pub minimum_change_request_approvals: Option<u32>,
}

impl Environment {
    /// Whether changes in this environment go through change requests.
    pub fn change_requests_enabled(&self) -> bool {
        self.minimum_change_request_approvals.is_some()
    }

    /// Approvals required before a change request may be published.
    pub fn required_approvals(&self) -> u32 {
        self.minimum_change_request_approvals.unwrap_or(0)
    }
}
