//! Change request model.

use super::flag_value::FlagValue;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display state of a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeRequestStatus {
    /// Awaiting approval / publish.
    Open,
    /// Its feature state goes live in the future.
    Scheduled,
    /// Applied to the environment.
    Committed,
}

impl std::fmt::Display for ChangeRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Scheduled => write!(f, "scheduled"),
            Self::Committed => write!(f, "committed"),
        }
    }
}

/// An approval recorded against (or requested for) a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// User asked to approve.
    pub user: i64,

    /// Set once the user has approved.
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
}

impl Approval {
    /// A pending approval request for `user`.
    pub fn pending(user: i64) -> Self {
        Self {
            id: None,
            user,
            approved_at: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.approved_at.is_some()
    }
}

/// A group asked to review the change request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupAssignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub group: i64,
}

/// Percentage of traffic allocated to one multivariate option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultivariateAllocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Project-level multivariate option ID.
    pub multivariate_feature_option: i64,

    pub percentage_allocation: f64,
}

/// Validate a set of allocations: each within [0, 100], total at most 100.
pub(crate) fn validate_allocations(allocations: &[MultivariateAllocation]) -> Result<(), AppError> {
    for allocation in allocations {
        if !(0.0..=100.0).contains(&allocation.percentage_allocation) {
            return Err(AppError::invalid_input_field(
                format!(
                    "Percentage allocation for option {} must be between 0 and 100",
                    allocation.multivariate_feature_option
                ),
                "multivariate_feature_state_values",
            ));
        }
    }

    let total: f64 = allocations.iter().map(|a| a.percentage_allocation).sum();
    if total > 100.0 {
        return Err(AppError::invalid_input_field(
            "Multivariate percentage values exceed 100%.",
            "multivariate_feature_state_values",
        ));
    }

    Ok(())
}

/// Proposed feature state carried by a change request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequestFeatureState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Feature (project flag) ID.
    pub feature: i64,

    pub enabled: bool,

    #[serde(default)]
    pub feature_state_value: FlagValue,

    /// When the state takes effect once committed.
    pub live_from: DateTime<Utc>,

    #[serde(default)]
    pub multivariate_feature_state_values: Vec<MultivariateAllocation>,
}

/// A proposed feature-state modification that needs approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: i64,

    pub title: String,

    #[serde(default)]
    pub description: Option<String>,

    /// Creator's user ID.
    pub user: i64,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub approvals: Vec<Approval>,

    #[serde(default)]
    pub group_assignments: Vec<GroupAssignment>,

    pub feature_states: Vec<ChangeRequestFeatureState>,

    #[serde(default)]
    pub committed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub committed_by: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<i64>,
}

impl ChangeRequest {
    /// The feature state the request proposes.
    ///
    /// Only the first entry is used; `validate` guarantees there is one.
    pub fn feature_state(&self) -> Option<&ChangeRequestFeatureState> {
        self.feature_states.first()
    }

    /// When the proposed state takes effect.
    pub fn live_from(&self) -> Option<DateTime<Utc>> {
        self.feature_state().map(|fs| fs.live_from)
    }

    pub fn is_committed(&self) -> bool {
        self.committed_at.is_some()
    }

    /// Approvals that have actually been given.
    pub fn given_approvals(&self) -> impl Iterator<Item = &Approval> {
        self.approvals.iter().filter(|a| a.is_approved())
    }

    /// Check the shape the rest of the crate relies on.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::invalid_input_field("Title may not be blank", "title"));
        }

        if self.feature_states.is_empty() {
            return Err(AppError::invalid_input_field(
                "Change request has no feature state",
                "feature_states",
            ));
        }

        for feature_state in &self.feature_states {
            validate_allocations(&feature_state.multivariate_feature_state_values)?;
        }

        Ok(())
    }
}
