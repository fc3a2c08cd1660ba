//! Events published by the change-request store.
//!
//! Snapshots tell subscribers *what* the state is; these events tell them
//! *what happened*, so pages can show transient notifications.

use serde::Serialize;

/// Which list of change requests a query fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListBucket {
    /// Uncommitted requests.
    Open,

    /// Committed history.
    Committed,

    /// Committed requests that are not live yet.
    Scheduled,
}

/// Key of a cached list: environment API key plus bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ListKey {
    pub environment: String,
    pub bucket: ListBucket,
}

impl ListKey {
    pub fn new(environment: impl Into<String>, bucket: ListBucket) -> Self {
        Self {
            environment: environment.into(),
            bucket,
        }
    }
}

/// Type of change-request update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeRequestUpdateType {
    /// Loaded from the API.
    Fetched,

    /// Edited and saved.
    Saved,

    /// Approved by the viewer.
    Approved,

    /// Committed (published).
    Committed,
}

/// Something the store did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StoreEvent {
    /// A list page was stored.
    ListUpdated { key: ListKey },

    /// A list query failed.
    ListFailed { key: ListKey, message: String },

    /// A change request was stored.
    ChangeRequestUpdated {
        id: i64,
        update_type: ChangeRequestUpdateType,
    },

    /// A change request could not be loaded; the page shows "not found".
    ChangeRequestFailed { id: i64, message: String },

    /// A change request was deleted.
    ChangeRequestRemoved { id: i64 },

    /// A mutation failed; state is unchanged.
    Problem { message: String },
}
