//! In-memory flag service used by the store and page tests.

#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use flag_console_lib::error::AppError;
use flag_console_lib::models::{
    Approval, ChangeRequest, ChangeRequestFeatureState, Environment, EnvironmentFlag,
    EnvironmentPermissions, FlagValue, MultivariateAllocation, MultivariateOption,
    OrganisationUser, ProjectFlag, UserGroup,
};
use flag_console_lib::services::api_client::{
    page_param, ChangeRequestAction, ChangeRequestListQuery, PagedResponse,
};
use flag_console_lib::services::ChangeRequestApi;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

pub const ENV_KEY: &str = "prod-key";
pub const PROJECT_ID: i64 = 3;
pub const FEATURE_ID: i64 = 50;

/// Fixed "current" instant of the tests.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
}

#[derive(Debug, Default)]
pub struct FakeState {
    pub change_requests: BTreeMap<i64, ChangeRequest>,
    pub project_flags: HashMap<i64, ProjectFlag>,
    pub environment_flags: HashMap<i64, EnvironmentFlag>,
    pub environment: Option<Environment>,
    pub permissions: EnvironmentPermissions,
    pub users: Vec<OrganisationUser>,
    pub groups: Vec<UserGroup>,

    /// User recorded by approve/commit.
    pub acting_user: i64,

    /// Delays applied, in call order, to change-request reads.
    pub delays: VecDeque<std::time::Duration>,

    pub fail_updates: bool,
    pub list_queries: Vec<ChangeRequestListQuery>,
    pub actions: Vec<(i64, ChangeRequestAction)>,
}

#[derive(Debug, Clone, Default)]
pub struct FakeApi {
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeApi {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Produce the response with the state as it is now, then wait out the
    /// next configured delay.
    async fn respond<T>(
        &self,
        f: impl FnOnce(&mut FakeState) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let (result, delay) = {
            let mut state = self.state.lock().await;
            let result = f(&mut state);
            (result, state.delays.pop_front())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

fn list_page(state: &mut FakeState, query: ChangeRequestListQuery) -> PagedResponse<ChangeRequest> {
    let matching: Vec<ChangeRequest> = state
        .change_requests
        .values()
        .filter(|cr| query.committed.map_or(true, |c| c == cr.is_committed()))
        .filter(|cr| {
            query
                .live_from_after
                .map_or(true, |after| cr.live_from().is_some_and(|l| l > after))
        })
        .cloned()
        .collect();

    let page = query.page.unwrap_or(1).max(1);
    let page_size = query.page_size.unwrap_or(20).max(1);
    let start = ((page - 1) * page_size) as usize;
    let results: Vec<ChangeRequest> = matching
        .iter()
        .skip(start)
        .take(page_size as usize)
        .cloned()
        .collect();

    let url = |p: u32| format!("http://fake.test/api/v1/list-change-requests/?page={}", p);
    let next = (start + results.len() < matching.len()).then(|| url(page + 1));
    let previous = (page > 1).then(|| url(page - 1));

    state.list_queries.push(query);
    PagedResponse {
        count: matching.len() as u32,
        next,
        previous,
        results,
    }
}

fn change_request_not_found(id: i64) -> AppError {
    AppError::not_found_with_id("Change request", id.to_string())
}

impl ChangeRequestApi for FakeApi {
    async fn list_change_requests(
        &self,
        _environment_key: &str,
        query: &ChangeRequestListQuery,
    ) -> Result<PagedResponse<ChangeRequest>, AppError> {
        let query = query.clone();
        self.respond(|state| Ok(list_page(state, query))).await
    }

    async fn list_change_requests_at(
        &self,
        page_url: &str,
    ) -> Result<PagedResponse<ChangeRequest>, AppError> {
        let page = page_param(page_url);
        self.respond(|state| {
            let mut query = state
                .list_queries
                .last()
                .cloned()
                .ok_or_else(|| AppError::invalid_input("No list to page through"))?;
            query.page = page;
            Ok(list_page(state, query))
        })
        .await
    }

    async fn get_change_request(&self, id: i64) -> Result<ChangeRequest, AppError> {
        self.respond(|state| {
            state
                .change_requests
                .get(&id)
                .cloned()
                .ok_or_else(|| change_request_not_found(id))
        })
        .await
    }

    async fn update_change_request(
        &self,
        change_request: &ChangeRequest,
    ) -> Result<ChangeRequest, AppError> {
        let mut state = self.state.lock().await;
        if state.fail_updates {
            return Err(AppError::api_full(
                "Server error",
                500,
                format!("/change-requests/{}/", change_request.id),
            ));
        }
        if !state.change_requests.contains_key(&change_request.id) {
            return Err(change_request_not_found(change_request.id));
        }
        let mut saved = change_request.clone();
        for (n, approval) in saved.approvals.iter_mut().enumerate() {
            approval.id.get_or_insert(1000 + n as i64);
        }
        state.change_requests.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn change_request_action(
        &self,
        id: i64,
        action: ChangeRequestAction,
    ) -> Result<ChangeRequest, AppError> {
        let mut state = self.state.lock().await;
        state.actions.push((id, action));
        let acting_user = state.acting_user;
        let environment_flag_update;
        let updated = {
            let cr = state
                .change_requests
                .get_mut(&id)
                .ok_or_else(|| change_request_not_found(id))?;
            match action {
                ChangeRequestAction::Approve => {
                    cr.approvals.retain(|a| a.user != acting_user);
                    cr.approvals.push(Approval {
                        id: Some(900),
                        user: acting_user,
                        approved_at: Some(now()),
                    });
                    environment_flag_update = None;
                }
                ChangeRequestAction::Commit => {
                    cr.committed_at = Some(now());
                    cr.committed_by = Some(acting_user);
                    environment_flag_update = cr.feature_state().cloned();
                }
            }
            cr.clone()
        };

        // Committing applies the proposed state to the live flag.
        if let Some(fs) = environment_flag_update {
            state.environment_flags.insert(
                fs.feature,
                EnvironmentFlag {
                    id: 1,
                    feature: fs.feature,
                    enabled: fs.enabled,
                    feature_state_value: fs.feature_state_value,
                    multivariate_feature_state_values: fs.multivariate_feature_state_values,
                },
            );
        }
        Ok(updated)
    }

    async fn delete_change_request(&self, id: i64) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        state
            .change_requests
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| change_request_not_found(id))
    }

    async fn get_project_flag(
        &self,
        _project_id: i64,
        feature_id: i64,
    ) -> Result<ProjectFlag, AppError> {
        let state = self.state.lock().await;
        state
            .project_flags
            .get(&feature_id)
            .cloned()
            .ok_or_else(|| AppError::not_found_with_id("Feature", feature_id.to_string()))
    }

    async fn get_environment_flag(
        &self,
        _environment_key: &str,
        feature_id: i64,
    ) -> Result<Option<EnvironmentFlag>, AppError> {
        let state = self.state.lock().await;
        Ok(state.environment_flags.get(&feature_id).cloned())
    }

    async fn get_environment(&self, environment_key: &str) -> Result<Environment, AppError> {
        let state = self.state.lock().await;
        state
            .environment
            .clone()
            .ok_or_else(|| AppError::not_found_with_id("Environment", environment_key))
    }

    async fn get_environment_permissions(
        &self,
        _environment_key: &str,
    ) -> Result<EnvironmentPermissions, AppError> {
        Ok(self.state.lock().await.permissions.clone())
    }

    async fn list_organisation_users(
        &self,
        _organisation_id: i64,
    ) -> Result<Vec<OrganisationUser>, AppError> {
        Ok(self.state.lock().await.users.clone())
    }

    async fn list_organisation_groups(
        &self,
        _organisation_id: i64,
    ) -> Result<Vec<UserGroup>, AppError> {
        Ok(self.state.lock().await.groups.clone())
    }
}

pub fn change_request(id: i64, author: i64, live_from: DateTime<Utc>) -> ChangeRequest {
    ChangeRequest {
        id,
        title: format!("Change request {}", id),
        description: None,
        user: author,
        created_at: now() - Duration::days(1),
        approvals: vec![],
        group_assignments: vec![],
        feature_states: vec![ChangeRequestFeatureState {
            id: None,
            feature: FEATURE_ID,
            enabled: true,
            feature_state_value: FlagValue::from("green"),
            live_from,
            multivariate_feature_state_values: vec![
                allocation(1, 40.0),
                allocation(2, 60.0),
            ],
        }],
        committed_at: None,
        committed_by: None,
        environment: Some(8),
    }
}

pub fn allocation(option: i64, percentage: f64) -> MultivariateAllocation {
    MultivariateAllocation {
        id: None,
        multivariate_feature_option: option,
        percentage_allocation: percentage,
    }
}

pub fn project_flag() -> ProjectFlag {
    let option = |id: i64, value: &str| MultivariateOption {
        id,
        value_type: Some("unicode".to_string()),
        string_value: Some(value.to_string()),
        integer_value: None,
        boolean_value: None,
        default_percentage_allocation: 50.0,
    };
    ProjectFlag {
        id: FEATURE_ID,
        name: "checkout_button".to_string(),
        flag_type: Some("MULTIVARIATE".to_string()),
        description: None,
        multivariate_options: vec![option(1, "a"), option(2, "b")],
    }
}

pub fn environment_flag() -> EnvironmentFlag {
    EnvironmentFlag {
        id: 1,
        feature: FEATURE_ID,
        enabled: false,
        feature_state_value: FlagValue::from("blue"),
        multivariate_feature_state_values: vec![allocation(1, 30.0), allocation(2, 70.0)],
    }
}

pub fn environment(minimum_approvals: Option<u32>) -> Environment {
    Environment {
        id: 8,
        api_key: ENV_KEY.to_string(),
        name: "Production".to_string(),
        project: PROJECT_ID,
        minimum_change_request_approvals: minimum_approvals,
    }
}

pub fn user(id: i64, first_name: &str) -> OrganisationUser {
    OrganisationUser {
        id,
        email: format!("{}@example.com", first_name.to_lowercase()),
        first_name: first_name.to_string(),
        last_name: String::new(),
    }
}

pub fn permissions(keys: &[&str]) -> EnvironmentPermissions {
    EnvironmentPermissions {
        admin: false,
        permissions: keys.iter().map(|k| k.to_string()).collect(),
    }
}

/// A fake holding `change_requests` plus flag data for their feature.
pub fn fake_with(change_requests: Vec<ChangeRequest>) -> FakeApi {
    let mut state = FakeState {
        environment: Some(environment(Some(1))),
        users: vec![user(1, "Ana"), user(2, "Ben"), user(3, "Cy")],
        groups: vec![UserGroup {
            id: 7,
            name: "Reviewers".to_string(),
            users: vec![],
        }],
        acting_user: 2,
        ..Default::default()
    };
    state.project_flags.insert(FEATURE_ID, project_flag());
    state.environment_flags.insert(FEATURE_ID, environment_flag());
    for cr in change_requests {
        state.change_requests.insert(cr.id, cr);
    }
    FakeApi::new(state)
}
