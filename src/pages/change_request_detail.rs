//! Change-request detail page.
//!
//! Shows one change request with its approvers, the diff against the live
//! flag, and the approve/publish controls, and performs the page actions.

use crate::error::AppError;
use crate::models::{
    Capability, ChangeRequest, ChangeRequestStatus, Environment, OrganisationUser, UserGroup,
    Viewer,
};
use crate::pages::change_request_list::author_name;
use crate::pages::routes::Route;
use crate::services::api_client::ChangeRequestAction;
use crate::services::approval_rules;
use crate::services::change_request_store::ChangeRequestStore;
use crate::services::feature_diff::{self, Emphasis, FeatureStateDiff};
use crate::services::remote::ChangeRequestApi;
use crate::services::store_events::ListBucket;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Everything the page needs besides the change request itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContext {
    pub environment: Environment,
    pub viewer: Viewer,
    pub users: Vec<OrganisationUser>,
    pub groups: Vec<UserGroup>,
}

impl PageContext {
    /// Load the environment, the viewer's permissions and the organisation's
    /// users and groups concurrently.
    pub async fn load<A: ChangeRequestApi>(
        api: &A,
        environment_key: &str,
        viewer_id: i64,
        organisation_id: i64,
    ) -> Result<Self, AppError> {
        let (environment, permissions, users, groups) = futures::try_join!(
            api.get_environment(environment_key),
            api.get_environment_permissions(environment_key),
            api.list_organisation_users(organisation_id),
            api.list_organisation_groups(organisation_id),
        )?;

        Ok(Self {
            environment,
            viewer: Viewer::new(viewer_id, permissions),
            users,
            groups,
        })
    }
}

/// Visibility and availability of a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlState {
    pub visible: bool,
    pub enabled: bool,
}

impl ControlState {
    const HIDDEN: Self = Self {
        visible: false,
        enabled: false,
    };
}

/// A user or group listed on the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Member {
    pub id: i64,
    pub name: String,
}

/// The diff block with per-part emphasis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffView {
    pub feature_name: Option<String>,
    pub diff: FeatureStateDiff,
    pub enabled_emphasis: Emphasis,
    pub value_emphasis: Emphasis,
    pub variations_emphasis: Option<Emphasis>,
}

/// View model of a loaded change request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailView {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub status: ChangeRequestStatus,
    pub live_from: Option<DateTime<Utc>>,
    pub committed_at: Option<DateTime<Utc>>,
    pub approved_by: Vec<Member>,
    pub pending_approvers: Vec<Member>,
    pub assigned_groups: Vec<Member>,
    /// False when the environment no longer requires change requests.
    pub change_requests_enabled: bool,
    pub approvals_required: u32,
    pub approvals_remaining: u32,
    pub approve: ControlState,
    pub publish: ControlState,
    pub publish_label: &'static str,
    pub can_edit: bool,
    pub diff: Option<DiffView>,
    pub saving: bool,
}

/// What the page renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "view", rename_all = "snake_case")]
pub enum DetailState {
    Loading,
    NotFound,
    Ready(Box<DetailView>),
}

/// Detail page for one change request.
pub struct ChangeRequestDetailPage<A> {
    store: ChangeRequestStore<A>,
    context: PageContext,
    project_id: i64,
    environment: String,
    bucket: ListBucket,
    id: i64,
}

impl<A: ChangeRequestApi> ChangeRequestDetailPage<A> {
    pub fn new(
        store: ChangeRequestStore<A>,
        context: PageContext,
        project_id: i64,
        environment: impl Into<String>,
        id: i64,
    ) -> Self {
        Self {
            store,
            context,
            project_id,
            environment: environment.into(),
            bucket: ListBucket::Open,
            id,
        }
    }

    /// Build the page for a route. Returns `None` for routes that are not a
    /// change-request detail page.
    pub fn for_route(
        store: ChangeRequestStore<A>,
        context: PageContext,
        route: &Route,
    ) -> Option<Self> {
        let (project_id, environment, id, bucket) = match route {
            Route::ChangeRequest {
                project_id,
                environment,
                id,
            } => (*project_id, environment.clone(), *id, ListBucket::Open),
            Route::ScheduledChange {
                project_id,
                environment,
                id,
            } => (*project_id, environment.clone(), *id, ListBucket::Scheduled),
            _ => return None,
        };

        let mut page = Self::new(store, context, project_id, environment, id);
        page.bucket = bucket;
        Some(page)
    }

    pub fn context(&self) -> &PageContext {
        &self.context
    }

    pub fn route(&self) -> Route {
        Route::detail(self.project_id, self.environment.clone(), self.bucket, self.id)
    }

    /// Load the change request and the flag data it is compared against.
    ///
    /// A failure leaves the page in its not-found state.
    pub async fn load(&self) -> Result<(), AppError> {
        self.store
            .fetch_one(self.id, self.project_id, &self.environment)
            .await
            .map(|_| ())
    }

    /// Approve as the viewer.
    pub async fn approve(&self) -> Result<ChangeRequest, AppError> {
        let change_request = self.current()?;
        if !approval_rules::can_approve(&self.context.viewer, &change_request) {
            return Err(AppError::permission_denied(
                "You cannot approve this change request",
            ));
        }
        self.store.act(self.id, ChangeRequestAction::Approve).await
    }

    /// Commit the change request, then reload its flags so the diff reflects
    /// the new live state. A failed reload keeps the previous flags.
    pub async fn publish(&self) -> Result<ChangeRequest, AppError> {
        let change_request = self.current()?;
        if !self.context.viewer.can(Capability::UpdateFeatureState) {
            return Err(AppError::permission_denied(
                "You cannot publish change requests in this environment",
            ));
        }
        if change_request.is_committed() {
            return Err(AppError::invalid_input("Change request is already committed"));
        }
        if !approval_rules::can_publish(&change_request, &self.context.environment) {
            return Err(AppError::invalid_input(format!(
                "{} more approval(s) required",
                approval_rules::approvals_remaining(&change_request, &self.context.environment)
            )));
        }

        let committed = self.store.act(self.id, ChangeRequestAction::Commit).await?;
        if let Err(e) = self
            .store
            .refresh_flags(self.id, self.project_id, &self.environment)
            .await
        {
            log::warn!("Reload after publishing {} failed: {}", self.id, e);
        }
        Ok(committed)
    }

    /// Delete the change request. Returns the list page to navigate to.
    pub async fn delete(&self) -> Result<Route, AppError> {
        self.store.remove(self.id, &self.environment).await?;
        Ok(Route::list(self.project_id, self.environment.clone(), self.bucket))
    }

    pub async fn assign_user(&self, user_id: i64) -> Result<ChangeRequest, AppError> {
        let change_request = self.editable()?;
        self.store
            .update(approval_rules::add_approver(&change_request, user_id))
            .await
    }

    pub async fn unassign_user(&self, user_id: i64) -> Result<ChangeRequest, AppError> {
        let change_request = self.editable()?;
        self.store
            .update(approval_rules::remove_approver(&change_request, user_id))
            .await
    }

    pub async fn assign_group(&self, group_id: i64) -> Result<ChangeRequest, AppError> {
        let change_request = self.editable()?;
        self.store
            .update(approval_rules::add_group(&change_request, group_id))
            .await
    }

    pub async fn unassign_group(&self, group_id: i64) -> Result<ChangeRequest, AppError> {
        let change_request = self.editable()?;
        self.store
            .update(approval_rules::remove_group(&change_request, group_id))
            .await
    }

    /// Change title and description.
    pub async fn edit(
        &self,
        title: impl Into<String>,
        description: Option<String>,
    ) -> Result<ChangeRequest, AppError> {
        let mut change_request = self.editable()?;
        change_request.title = title.into();
        change_request.description = description.filter(|d| !d.trim().is_empty());
        self.store.update(change_request).await
    }

    fn current(&self) -> Result<ChangeRequest, AppError> {
        self.store
            .snapshot()
            .change_request(self.id)
            .cloned()
            .ok_or_else(|| AppError::not_found_with_id("Change request", self.id.to_string()))
    }

    fn editable(&self) -> Result<ChangeRequest, AppError> {
        let change_request = self.current()?;
        if change_request.is_committed() {
            return Err(AppError::invalid_input(
                "Committed change requests cannot be edited",
            ));
        }
        Ok(change_request)
    }

    /// Build the view from the current store state.
    pub fn view(&self) -> DetailState {
        let snapshot = self.store.snapshot();
        if snapshot.is_errored(self.id) {
            return DetailState::NotFound;
        }
        let Some(change_request) = snapshot.change_request(self.id) else {
            return DetailState::Loading;
        };

        let now = self.store.now();
        let context = &self.context;
        let viewer = &context.viewer;
        let environment = &context.environment;
        let committed = change_request.is_committed();

        let approve = if approval_rules::can_see_approve_button(viewer) && !committed {
            ControlState {
                visible: true,
                enabled: approval_rules::can_approve(viewer, change_request),
            }
        } else {
            ControlState::HIDDEN
        };

        let publish = if approval_rules::can_see_publish_button(viewer) && !committed {
            ControlState {
                visible: true,
                enabled: approval_rules::can_publish(change_request, environment)
                    && !snapshot.is_saving(),
            }
        } else {
            ControlState::HIDDEN
        };

        let publish_label = if approval_rules::is_scheduled(change_request, now) {
            "Publish scheduled change"
        } else {
            "Publish change"
        };

        let diff = snapshot.flags(self.id).and_then(|flags| {
            let diff = feature_diff::feature_state_diff(flags, change_request)?;
            Some(DiffView {
                feature_name: flags.project_flag.as_ref().map(|f| f.name.clone()),
                enabled_emphasis: feature_diff::emphasis(diff.enabled.changed, committed),
                value_emphasis: feature_diff::emphasis(diff.value.changed, committed),
                variations_emphasis: diff
                    .variations
                    .as_ref()
                    .map(|v| feature_diff::emphasis(v.any_changed, committed)),
                diff,
            })
        });

        let users = |list: Vec<&OrganisationUser>| -> Vec<Member> {
            list.into_iter()
                .map(|u| Member {
                    id: u.id,
                    name: u.display_name(),
                })
                .collect()
        };

        DetailState::Ready(Box::new(DetailView {
            id: change_request.id,
            title: change_request.title.clone(),
            description: change_request.description.clone(),
            author: author_name(&context.users, change_request.user),
            created_at: change_request.created_at,
            status: approval_rules::status(change_request, now),
            live_from: change_request.live_from(),
            committed_at: change_request.committed_at,
            approved_by: users(approval_rules::approved_users(change_request, &context.users)),
            pending_approvers: users(approval_rules::pending_approvers(
                change_request,
                &context.users,
            )),
            assigned_groups: approval_rules::assigned_groups(change_request, &context.groups)
                .into_iter()
                .map(|g| Member {
                    id: g.id,
                    name: g.name.clone(),
                })
                .collect(),
            change_requests_enabled: environment.change_requests_enabled(),
            approvals_required: environment.required_approvals(),
            approvals_remaining: approval_rules::approvals_remaining(change_request, environment),
            approve,
            publish,
            publish_label,
            can_edit: !committed,
            diff,
            saving: snapshot.is_saving(),
        }))
    }
}
