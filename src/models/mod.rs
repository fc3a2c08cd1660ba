//! Data models for the application.
//!
//! These models mirror the payloads of the remote API. Everything derives
//! Serialize/Deserialize so responses are decoded into typed values at the
//! client boundary and re-encoded for mutating calls.

pub mod change_request;
pub mod environment;
pub mod feature;
pub mod flag_value;
pub mod permission;
pub mod user;

// Re-exports for convenient access
pub use change_request::{
    Approval, ChangeRequest, ChangeRequestFeatureState, ChangeRequestStatus, GroupAssignment,
    MultivariateAllocation,
};
pub use environment::Environment;
pub use feature::{ChangeRequestFlags, EnvironmentFlag, MultivariateOption, ProjectFlag};
pub use flag_value::FlagValue;
pub use permission::{Capability, EnvironmentPermissions, Viewer};
pub use user::{OrganisationUser, UserGroup};
