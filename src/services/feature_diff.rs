//! Old-vs-new comparison of a change request's proposed feature state
//! against the live environment flag.
//!
//! All functions are pure; recomputing on every render is fine.

use crate::models::{
    ChangeRequest, ChangeRequestFeatureState, ChangeRequestFlags, EnvironmentFlag, FlagValue,
    ProjectFlag,
};
use serde::Serialize;

/// Old and new value of one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueDiff<T> {
    pub old: T,
    pub new: T,
    pub changed: bool,
}

impl<T: PartialEq> ValueDiff<T> {
    fn new(old: T, new: T) -> Self {
        let changed = old != new;
        Self { old, new, changed }
    }
}

/// How prominently a diff block is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Emphasis {
    Full,
    Muted,
}

/// Unchanged blocks are muted until the request is committed; after that
/// the block is the delta that was applied and is always shown in full.
pub fn emphasis(changed: bool, committed: bool) -> Emphasis {
    if changed || committed {
        Emphasis::Full
    } else {
        Emphasis::Muted
    }
}

/// Enabled state of the live flag vs the proposal. A missing live flag
/// counts as disabled.
pub fn enabled_diff(
    environment_flag: Option<&EnvironmentFlag>,
    proposed: &ChangeRequestFeatureState,
) -> ValueDiff<bool> {
    let old = environment_flag.is_some_and(|f| f.enabled);
    ValueDiff::new(old, proposed.enabled)
}

/// Value of the live flag vs the proposal, compared after decoding stored
/// strings into their natural type.
pub fn value_diff(
    environment_flag: Option<&EnvironmentFlag>,
    proposed: &ChangeRequestFeatureState,
) -> ValueDiff<FlagValue> {
    let old = environment_flag
        .map(|f| f.feature_state_value.decoded())
        .unwrap_or_default();
    ValueDiff::new(old, proposed.feature_state_value.decoded())
}

/// Allocation change for one variation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariationDiff {
    pub option_id: i64,
    pub value: FlagValue,
    pub old_percentage: f64,
    pub new_percentage: f64,
    pub changed: bool,
}

/// Allocation changes across all variations of a flag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MultivariateDiff {
    pub variations: Vec<VariationDiff>,
    pub any_changed: bool,
}

/// Pair live and proposed allocations by option ID, one row per option of
/// the project flag. Missing allocations count as 0%.
///
/// Returns `None` for flags without variations.
pub fn multivariate_diff(
    project_flag: &ProjectFlag,
    environment_flag: Option<&EnvironmentFlag>,
    proposed: &ChangeRequestFeatureState,
) -> Option<MultivariateDiff> {
    if !project_flag.is_multivariate() {
        return None;
    }

    let variations: Vec<VariationDiff> = project_flag
        .multivariate_options
        .iter()
        .map(|option| {
            let old_percentage = environment_flag
                .and_then(|f| f.allocation(option.id))
                .unwrap_or(0.0);
            let new_percentage = proposed
                .multivariate_feature_state_values
                .iter()
                .find(|a| a.multivariate_feature_option == option.id)
                .map(|a| a.percentage_allocation)
                .unwrap_or(0.0);

            VariationDiff {
                option_id: option.id,
                value: option.value(),
                old_percentage,
                new_percentage,
                changed: (old_percentage - new_percentage).abs() > f64::EPSILON,
            }
        })
        .collect();

    let any_changed = variations.iter().any(|v| v.changed);
    Some(MultivariateDiff {
        variations,
        any_changed,
    })
}

/// Full comparison shown on the change-request page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureStateDiff {
    pub enabled: ValueDiff<bool>,
    pub value: ValueDiff<FlagValue>,
    pub variations: Option<MultivariateDiff>,
}

impl FeatureStateDiff {
    pub fn any_changed(&self) -> bool {
        self.enabled.changed
            || self.value.changed
            || self.variations.as_ref().is_some_and(|v| v.any_changed)
    }
}

/// Compare a change request against the flag data fetched for it.
pub fn feature_state_diff(
    flags: &ChangeRequestFlags,
    change_request: &ChangeRequest,
) -> Option<FeatureStateDiff> {
    let proposed = change_request.feature_state()?;
    let environment_flag = flags.environment_flag.as_ref();

    Some(FeatureStateDiff {
        enabled: enabled_diff(environment_flag, proposed),
        value: value_diff(environment_flag, proposed),
        variations: flags
            .project_flag
            .as_ref()
            .and_then(|pf| multivariate_diff(pf, environment_flag, proposed)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MultivariateAllocation, MultivariateOption};
    use chrono::{TimeZone, Utc};

    fn allocation(option: i64, pct: f64) -> MultivariateAllocation {
        MultivariateAllocation {
            id: None,
            multivariate_feature_option: option,
            percentage_allocation: pct,
        }
    }

    fn option(id: i64, value: &str) -> MultivariateOption {
        MultivariateOption {
            id,
            value_type: Some("unicode".to_string()),
            string_value: Some(value.to_string()),
            integer_value: None,
            boolean_value: None,
            default_percentage_allocation: 0.0,
        }
    }

    fn project_flag() -> ProjectFlag {
        ProjectFlag {
            id: 5,
            name: "button_colour".to_string(),
            flag_type: Some("MULTIVARIATE".to_string()),
            description: None,
            multivariate_options: vec![option(1, "red"), option(2, "green")],
        }
    }

    fn live(
        enabled: bool,
        value: FlagValue,
        allocations: Vec<MultivariateAllocation>,
    ) -> EnvironmentFlag {
        EnvironmentFlag {
            id: 9,
            feature: 5,
            enabled,
            feature_state_value: value,
            multivariate_feature_state_values: allocations,
        }
    }

    fn proposed(
        enabled: bool,
        value: FlagValue,
        allocations: Vec<MultivariateAllocation>,
    ) -> ChangeRequestFeatureState {
        ChangeRequestFeatureState {
            id: None,
            feature: 5,
            enabled,
            feature_state_value: value,
            live_from: Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap(),
            multivariate_feature_state_values: allocations,
        }
    }

    #[test]
    fn test_allocation_change_marks_both_rows() {
        let env = live(true, FlagValue::None, vec![allocation(1, 30.0), allocation(2, 70.0)]);
        let new = proposed(true, FlagValue::None, vec![allocation(1, 40.0), allocation(2, 60.0)]);

        let diff = multivariate_diff(&project_flag(), Some(&env), &new).unwrap();
        assert!(diff.variations.iter().all(|v| v.changed));
        assert!(diff.any_changed);
        assert_eq!(diff.variations[0].old_percentage, 30.0);
        assert_eq!(diff.variations[0].new_percentage, 40.0);
        assert_eq!(diff.variations[1].value, FlagValue::from("green"));
    }

    #[test]
    fn test_identical_allocations_unchanged() {
        let env = live(true, FlagValue::None, vec![allocation(1, 30.0), allocation(2, 70.0)]);
        let new = proposed(true, FlagValue::None, vec![allocation(2, 70.0), allocation(1, 30.0)]);

        let diff = multivariate_diff(&project_flag(), Some(&env), &new).unwrap();
        assert!(diff.variations.iter().all(|v| !v.changed));
        assert!(!diff.any_changed);
    }

    #[test]
    fn test_standard_flag_has_no_variation_diff() {
        let mut flag = project_flag();
        flag.multivariate_options.clear();
        let new = proposed(true, FlagValue::None, vec![]);
        assert!(multivariate_diff(&flag, None, &new).is_none());
    }

    #[test]
    fn test_value_compared_after_decoding() {
        let env = live(false, FlagValue::from("5"), vec![]);
        let new = proposed(true, FlagValue::Integer(5), vec![]);

        let value = value_diff(Some(&env), &new);
        assert!(!value.changed);
        assert_eq!(value.old, FlagValue::Integer(5));

        let enabled = enabled_diff(Some(&env), &new);
        assert!(enabled.changed);
        assert!(!enabled.old);
    }

    #[test]
    fn test_missing_live_flag_counts_as_disabled() {
        let new = proposed(false, FlagValue::None, vec![]);
        let enabled = enabled_diff(None, &new);
        assert!(!enabled.changed);
    }

    #[test]
    fn test_diff_is_idempotent() {
        let env = live(true, FlagValue::from("a"), vec![allocation(1, 50.0)]);
        let new = proposed(
            true,
            FlagValue::from("b"),
            vec![allocation(1, 25.0), allocation(2, 25.0)],
        );
        let flag = project_flag();

        let first = (value_diff(Some(&env), &new), multivariate_diff(&flag, Some(&env), &new));
        let second = (value_diff(Some(&env), &new), multivariate_diff(&flag, Some(&env), &new));
        assert_eq!(first, second);
    }

    #[test]
    fn test_emphasis() {
        assert_eq!(emphasis(false, false), Emphasis::Muted);
        assert_eq!(emphasis(true, false), Emphasis::Full);
        assert_eq!(emphasis(false, true), Emphasis::Full);
    }
}
