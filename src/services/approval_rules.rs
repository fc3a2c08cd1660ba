//! Approval and publish rules for change requests.
//!
//! Everything here is a pure function of its arguments. Callers pass the
//! current instant explicitly (see [`crate::services::clock`]).

use crate::models::{
    Approval, Capability, ChangeRequest, ChangeRequestStatus, Environment, GroupAssignment,
    OrganisationUser, UserGroup, Viewer,
};
use chrono::{DateTime, Utc};

/// Whether the proposed state goes live strictly after `now`.
pub fn is_scheduled(change_request: &ChangeRequest, now: DateTime<Utc>) -> bool {
    change_request
        .live_from()
        .is_some_and(|live_from| now < live_from)
}

/// How the change request should be framed.
///
/// A future `live_from` frames it as scheduled whether or not it has been
/// committed yet.
pub fn status(change_request: &ChangeRequest, now: DateTime<Utc>) -> ChangeRequestStatus {
    if is_scheduled(change_request, now) {
        ChangeRequestStatus::Scheduled
    } else if change_request.is_committed() {
        ChangeRequestStatus::Committed
    } else {
        ChangeRequestStatus::Open
    }
}

/// Number of approvals that have been given.
pub fn approved_count(change_request: &ChangeRequest) -> u32 {
    change_request.given_approvals().count() as u32
}

/// Whether enough approvals have been given to publish.
pub fn can_publish(change_request: &ChangeRequest, environment: &Environment) -> bool {
    approved_count(change_request) >= environment.required_approvals()
}

/// Approvals still missing before publishing is possible.
pub fn approvals_remaining(change_request: &ChangeRequest, environment: &Environment) -> u32 {
    environment
        .required_approvals()
        .saturating_sub(approved_count(change_request))
}

/// Organisation users who have approved.
pub fn approved_users<'a>(
    change_request: &ChangeRequest,
    users: &'a [OrganisationUser],
) -> Vec<&'a OrganisationUser> {
    users
        .iter()
        .filter(|u| change_request.given_approvals().any(|a| a.user == u.id))
        .collect()
}

/// Users asked to approve who have not done so yet.
pub fn pending_approvers<'a>(
    change_request: &ChangeRequest,
    users: &'a [OrganisationUser],
) -> Vec<&'a OrganisationUser> {
    users
        .iter()
        .filter(|u| {
            change_request
                .approvals
                .iter()
                .any(|a| a.user == u.id && !a.is_approved())
        })
        .collect()
}

/// Groups assigned to review the change request.
pub fn assigned_groups<'a>(
    change_request: &ChangeRequest,
    groups: &'a [UserGroup],
) -> Vec<&'a UserGroup> {
    groups
        .iter()
        .filter(|g| change_request.group_assignments.iter().any(|a| a.group == g.id))
        .collect()
}

/// Whether `user_id` has already approved.
pub fn has_approved(change_request: &ChangeRequest, user_id: i64) -> bool {
    change_request.given_approvals().any(|a| a.user == user_id)
}

/// Whether the viewer may approve: not the creator, holds the approve
/// permission, and has not approved already.
pub fn can_approve(viewer: &Viewer, change_request: &ChangeRequest) -> bool {
    viewer.user_id != change_request.user
        && viewer.can(Capability::ApproveChangeRequest)
        && !has_approved(change_request, viewer.user_id)
}

/// Whether the approve control is shown at all.
pub fn can_see_approve_button(viewer: &Viewer) -> bool {
    viewer.can(Capability::ApproveChangeRequest)
}

/// Whether the publish control is shown at all.
pub fn can_see_publish_button(viewer: &Viewer) -> bool {
    viewer.can(Capability::UpdateFeatureState)
}

/// Ask `user_id` to approve. No-op if already asked.
pub fn add_approver(change_request: &ChangeRequest, user_id: i64) -> ChangeRequest {
    let mut updated = change_request.clone();
    if !updated.approvals.iter().any(|a| a.user == user_id) {
        updated.approvals.push(Approval::pending(user_id));
    }
    updated
}

/// Drop `user_id` from the approvers.
pub fn remove_approver(change_request: &ChangeRequest, user_id: i64) -> ChangeRequest {
    let mut updated = change_request.clone();
    updated.approvals.retain(|a| a.user != user_id);
    updated
}

/// Assign group `group_id`. No-op if already assigned.
pub fn add_group(change_request: &ChangeRequest, group_id: i64) -> ChangeRequest {
    let mut updated = change_request.clone();
    if !updated.group_assignments.iter().any(|g| g.group == group_id) {
        updated.group_assignments.push(GroupAssignment {
            id: None,
            group: group_id,
        });
    }
    updated
}

/// Unassign group `group_id`.
pub fn remove_group(change_request: &ChangeRequest, group_id: i64) -> ChangeRequest {
    let mut updated = change_request.clone();
    updated.group_assignments.retain(|g| g.group != group_id);
    updated
}
