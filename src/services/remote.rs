//! Remote operations the store and pages depend on.
//!
//! [`ChangeRequestApi`] is the seam between the change-request core and the
//! HTTP transport. [`ApiClient`] is the production implementation; tests
//! substitute an in-memory one.

use crate::error::AppError;
use crate::models::{
    ChangeRequest, Environment, EnvironmentFlag, EnvironmentPermissions, OrganisationUser,
    ProjectFlag, UserGroup,
};
use crate::services::api_client::{
    ApiClient, ChangeRequestAction, ChangeRequestListQuery, PagedResponse,
};
use std::future::Future;

/// Remote operations used by the change-request workflow.
pub trait ChangeRequestApi: Send + Sync + 'static {
    fn list_change_requests(
        &self,
        environment_key: &str,
        query: &ChangeRequestListQuery,
    ) -> impl Future<Output = Result<PagedResponse<ChangeRequest>, AppError>> + Send;

    fn list_change_requests_at(
        &self,
        page_url: &str,
    ) -> impl Future<Output = Result<PagedResponse<ChangeRequest>, AppError>> + Send;

    fn get_change_request(
        &self,
        id: i64,
    ) -> impl Future<Output = Result<ChangeRequest, AppError>> + Send;

    fn update_change_request(
        &self,
        change_request: &ChangeRequest,
    ) -> impl Future<Output = Result<ChangeRequest, AppError>> + Send;

    fn change_request_action(
        &self,
        id: i64,
        action: ChangeRequestAction,
    ) -> impl Future<Output = Result<ChangeRequest, AppError>> + Send;

    fn delete_change_request(&self, id: i64) -> impl Future<Output = Result<(), AppError>> + Send;

    fn get_project_flag(
        &self,
        project_id: i64,
        feature_id: i64,
    ) -> impl Future<Output = Result<ProjectFlag, AppError>> + Send;

    fn get_environment_flag(
        &self,
        environment_key: &str,
        feature_id: i64,
    ) -> impl Future<Output = Result<Option<EnvironmentFlag>, AppError>> + Send;

    fn get_environment(
        &self,
        environment_key: &str,
    ) -> impl Future<Output = Result<Environment, AppError>> + Send;

    fn get_environment_permissions(
        &self,
        environment_key: &str,
    ) -> impl Future<Output = Result<EnvironmentPermissions, AppError>> + Send;

    fn list_organisation_users(
        &self,
        organisation_id: i64,
    ) -> impl Future<Output = Result<Vec<OrganisationUser>, AppError>> + Send;

    fn list_organisation_groups(
        &self,
        organisation_id: i64,
    ) -> impl Future<Output = Result<Vec<UserGroup>, AppError>> + Send;
}

impl ChangeRequestApi for ApiClient {
    async fn list_change_requests(
        &self,
        environment_key: &str,
        query: &ChangeRequestListQuery,
    ) -> Result<PagedResponse<ChangeRequest>, AppError> {
        ApiClient::list_change_requests(self, environment_key, query).await
    }

    async fn list_change_requests_at(
        &self,
        page_url: &str,
    ) -> Result<PagedResponse<ChangeRequest>, AppError> {
        ApiClient::list_change_requests_at(self, page_url).await
    }

    async fn get_change_request(&self, id: i64) -> Result<ChangeRequest, AppError> {
        ApiClient::get_change_request(self, id).await
    }

    async fn update_change_request(
        &self,
        change_request: &ChangeRequest,
    ) -> Result<ChangeRequest, AppError> {
        ApiClient::update_change_request(self, change_request).await
    }

    async fn change_request_action(
        &self,
        id: i64,
        action: ChangeRequestAction,
    ) -> Result<ChangeRequest, AppError> {
        ApiClient::change_request_action(self, id, action).await
    }

    async fn delete_change_request(&self, id: i64) -> Result<(), AppError> {
        ApiClient::delete_change_request(self, id).await
    }

    async fn get_project_flag(
        &self,
        project_id: i64,
        feature_id: i64,
    ) -> Result<ProjectFlag, AppError> {
        ApiClient::get_project_flag(self, project_id, feature_id).await
    }

    async fn get_environment_flag(
        &self,
        environment_key: &str,
        feature_id: i64,
    ) -> Result<Option<EnvironmentFlag>, AppError> {
        ApiClient::get_environment_flag(self, environment_key, feature_id).await
    }

    async fn get_environment(&self, environment_key: &str) -> Result<Environment, AppError> {
        ApiClient::get_environment(self, environment_key).await
    }

    async fn get_environment_permissions(
        &self,
        environment_key: &str,
    ) -> Result<EnvironmentPermissions, AppError> {
        ApiClient::get_environment_permissions(self, environment_key).await
    }

    async fn list_organisation_users(
        &self,
        organisation_id: i64,
    ) -> Result<Vec<OrganisationUser>, AppError> {
        ApiClient::list_organisation_users(self, organisation_id).await
    }

    async fn list_organisation_groups(
        &self,
        organisation_id: i64,
    ) -> Result<Vec<UserGroup>, AppError> {
        ApiClient::list_organisation_groups(self, organisation_id).await
    }
}
