//! Project flag definitions and live environment flag state.

use super::change_request::{validate_allocations, MultivariateAllocation};
use super::flag_value::FlagValue;
use crate::error::AppError;
use serde::{Deserialize, Serialize};

/// A variation of a multivariate flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultivariateOption {
    pub id: i64,

    #[serde(rename = "type", default)]
    pub value_type: Option<String>,

    #[serde(default)]
    pub string_value: Option<String>,

    #[serde(default)]
    pub integer_value: Option<i64>,

    #[serde(default)]
    pub boolean_value: Option<bool>,

    #[serde(default)]
    pub default_percentage_allocation: f64,
}

impl MultivariateOption {
    /// Value served for this variation.
    pub fn value(&self) -> FlagValue {
        FlagValue::from_parts(
            self.value_type.as_deref(),
            self.string_value.clone(),
            self.integer_value,
            self.boolean_value,
        )
    }
}

/// Project-level flag definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFlag {
    pub id: i64,

    pub name: String,

    /// `STANDARD` or `MULTIVARIATE`.
    #[serde(rename = "type", default)]
    pub flag_type: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub multivariate_options: Vec<MultivariateOption>,
}

impl ProjectFlag {
    pub fn is_multivariate(&self) -> bool {
        !self.multivariate_options.is_empty()
    }
}

/// Current live state of a flag in one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentFlag {
    pub id: i64,

    pub feature: i64,

    pub enabled: bool,

    #[serde(default)]
    pub feature_state_value: FlagValue,

    #[serde(default)]
    pub multivariate_feature_state_values: Vec<MultivariateAllocation>,
}

impl EnvironmentFlag {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_allocations(&self.multivariate_feature_state_values)
    }

    /// Allocation for one variation, if the environment sets one.
    pub fn allocation(&self, option_id: i64) -> Option<f64> {
        self.multivariate_feature_state_values
            .iter()
            .find(|a| a.multivariate_feature_option == option_id)
            .map(|a| a.percentage_allocation)
    }
}

/// Flag data a change request is diffed against.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeRequestFlags {
    pub project_flag: Option<ProjectFlag>,
    pub environment_flag: Option<EnvironmentFlag>,
}
