//! Business logic services.
//!
//! This module contains the API client, the change-request store and the
//! pure rule and diff functions the pages are built from.
//!
//! Services are independent of any rendering layer.

pub mod api_client;
pub mod approval_rules;
pub mod change_request_store;
pub mod clock;
pub mod feature_diff;
pub mod remote;
pub mod store_events;

pub use api_client::{ApiClient, ApiClientConfig, ChangeRequestAction};
pub use change_request_store::{ChangeRequestList, ChangeRequestStore, PageRequest, StoreSnapshot};
pub use clock::{Clock, ManualClock, SystemClock};
pub use remote::ChangeRequestApi;
pub use store_events::{ChangeRequestUpdateType, ListBucket, ListKey, StoreEvent};
