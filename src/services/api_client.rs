//! Remote API client.
//!
//! Provides the HTTP client for the flag service admin API with token
//! authentication and page-number pagination.

use crate::error::AppError;
use crate::models::{
    ChangeRequest, Environment, EnvironmentFlag, EnvironmentPermissions, OrganisationUser,
    ProjectFlag, UserGroup,
};
use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// API client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiClientConfig {
    /// Base URL of the API host (e.g., `https://flags.example.com`).
    pub base_url: String,

    /// API token for authentication.
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

/// Admin API client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiClientConfig,
}

/// Paginated list response.
///
/// `next` and `previous` are absolute URLs and are treated as opaque page
/// tokens.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PagedResponse<T> {
    /// Total number of items across all pages.
    #[serde(default)]
    pub count: u32,

    #[serde(default)]
    pub next: Option<String>,

    #[serde(default)]
    pub previous: Option<String>,

    pub results: Vec<T>,
}

/// Extract the `page` query parameter from a page URL.
///
/// A `previous` URL without a `page` parameter points at page 1.
pub fn page_param(url: &str) -> Option<u32> {
    let url = Url::parse(url).ok()?;
    let page = url
        .query_pairs()
        .find(|(key, _)| key == "page")
        .and_then(|(_, value)| value.parse().ok());
    Some(page.unwrap_or(1))
}

/// Query parameters for listing change requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeRequestListQuery {
    /// `false` for open requests, `true` for committed history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed: Option<bool>,

    /// Only requests whose feature state goes live after this instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live_from_after: Option<DateTime<Utc>>,

    /// Page number for pagination.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Number of items per page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

/// Server-side state transitions of a change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeRequestAction {
    Approve,
    Commit,
}

impl std::fmt::Display for ChangeRequestAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "approve"),
            Self::Commit => write!(f, "commit"),
        }
    }
}

/// Map a failed response to an application error.
fn error_for_status(status: StatusCode, body: &str, endpoint: &str) -> AppError {
    let body_message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            // Errors come back as {"detail": "..."}, {"message": "..."} or a
            // field map like {"title": ["may not be blank"]}.
            match v.get("detail").or_else(|| v.get("message")) {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
                None if v.is_object() || v.is_array() => Some(v.to_string()),
                None => None,
            }
        });

    match status {
        StatusCode::UNAUTHORIZED => {
            AppError::authentication("API token expired or revoked. Please sign in again.")
        }
        StatusCode::FORBIDDEN => AppError::permission_denied(
            body_message.unwrap_or_else(|| "Access denied".to_string()),
        ),
        StatusCode::NOT_FOUND => AppError::not_found_with_id("Resource", endpoint),
        StatusCode::BAD_REQUEST => AppError::invalid_input(
            body_message.unwrap_or_else(|| "Request rejected".to_string()),
        ),
        StatusCode::TOO_MANY_REQUESTS => {
            AppError::api_full("Rate limit exceeded", status.as_u16(), endpoint)
        }
        _ => AppError::api_full(
            body_message.unwrap_or_else(|| format!("Request failed ({})", status.as_u16())),
            status.as_u16(),
            endpoint,
        ),
    }
}

impl ApiClient {
    /// Create a new API client.
    pub fn new(config: ApiClientConfig) -> Result<Self, AppError> {
        let mut headers = header::HeaderMap::new();

        let token_value = header::HeaderValue::from_str(&format!("Token {}", config.token))
            .map_err(|_| AppError::authentication("Invalid token format"))?;
        headers.insert(header::AUTHORIZATION, token_value);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ApiClientConfig {
        &self.config
    }

    fn base(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Get the full URL for an API path.
    fn api_url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base(), path)
    }

    /// Decode a successful response or map the failure.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, AppError> {
        let status = response.status();

        if status.is_success() {
            response
                .json::<T>()
                .await
                .map_err(|e| AppError::internal(format!("Failed to parse response: {}", e)))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(error_for_status(status, &body, endpoint))
        }
    }

    /// Check a response that carries no body on success.
    async fn handle_empty(&self, response: Response, endpoint: &str) -> Result<(), AppError> {
        let status = response.status();

        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(error_for_status(status, &body, endpoint))
        }
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, AppError> {
        log::debug!("GET {}", endpoint);
        let response = self.client.get(self.api_url(endpoint)).send().await?;
        self.handle_response(response, endpoint).await
    }

    /// Fetch a page by the absolute URL the API handed out.
    ///
    /// The URL must point at the configured host so the token is never sent
    /// elsewhere.
    async fn get_absolute<T: DeserializeOwned>(&self, url: &str) -> Result<T, AppError> {
        if !url.starts_with(&format!("{}/", self.base())) {
            return Err(AppError::invalid_input_field(
                format!("Page URL is not on {}", self.base()),
                "page_url",
            ));
        }

        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        self.handle_response(response, url).await
    }

    /// Fetch all pages of a paginated endpoint by following `next`.
    pub async fn get_all_pages<T: DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<Vec<T>, AppError> {
        let mut page: PagedResponse<T> = self.get(endpoint).await?;
        let mut all_data = std::mem::take(&mut page.results);

        while let Some(next) = page.next.take() {
            page = self.get_absolute(&next).await?;
            all_data.append(&mut page.results);
        }

        Ok(all_data)
    }

    /// List change requests of an environment.
    pub async fn list_change_requests(
        &self,
        environment_key: &str,
        query: &ChangeRequestListQuery,
    ) -> Result<PagedResponse<ChangeRequest>, AppError> {
        let endpoint = format!(
            "/environments/{}/list-change-requests/",
            urlencoding::encode(environment_key)
        );
        log::debug!("GET {} {:?}", endpoint, query);
        let response = self
            .client
            .get(self.api_url(&endpoint))
            .query(query)
            .send()
            .await?;
        self.handle_response(response, &endpoint).await
    }

    /// Follow a `next`/`previous` link of a change request list.
    pub async fn list_change_requests_at(
        &self,
        page_url: &str,
    ) -> Result<PagedResponse<ChangeRequest>, AppError> {
        self.get_absolute(page_url).await
    }

    /// Get a single change request.
    pub async fn get_change_request(&self, id: i64) -> Result<ChangeRequest, AppError> {
        self.get(&format!("/change-requests/{}/", id)).await
    }

    /// Replace a change request with the given object.
    pub async fn update_change_request(
        &self,
        change_request: &ChangeRequest,
    ) -> Result<ChangeRequest, AppError> {
        let endpoint = format!("/change-requests/{}/", change_request.id);
        log::debug!("PUT {}", endpoint);
        let response = self
            .client
            .put(self.api_url(&endpoint))
            .json(change_request)
            .send()
            .await?;
        self.handle_response(response, &endpoint).await
    }

    /// Approve or commit a change request.
    pub async fn change_request_action(
        &self,
        id: i64,
        action: ChangeRequestAction,
    ) -> Result<ChangeRequest, AppError> {
        let endpoint = format!("/change-requests/{}/{}/", id, action);
        log::debug!("POST {}", endpoint);
        let response = self.client.post(self.api_url(&endpoint)).send().await?;
        self.handle_response(response, &endpoint).await
    }

    /// Delete a change request.
    pub async fn delete_change_request(&self, id: i64) -> Result<(), AppError> {
        let endpoint = format!("/change-requests/{}/", id);
        log::debug!("DELETE {}", endpoint);
        let response = self.client.delete(self.api_url(&endpoint)).send().await?;
        self.handle_empty(response, &endpoint).await
    }

    /// Get a project-level flag definition.
    pub async fn get_project_flag(
        &self,
        project_id: i64,
        feature_id: i64,
    ) -> Result<ProjectFlag, AppError> {
        self.get(&format!("/projects/{}/features/{}/", project_id, feature_id))
            .await
    }

    /// Get the live state of a flag in an environment, if it has one.
    pub async fn get_environment_flag(
        &self,
        environment_key: &str,
        feature_id: i64,
    ) -> Result<Option<EnvironmentFlag>, AppError> {
        let endpoint = format!(
            "/environments/{}/featurestates/?feature={}",
            urlencoding::encode(environment_key),
            feature_id
        );
        let page: PagedResponse<EnvironmentFlag> = self.get(&endpoint).await?;
        Ok(page.results.into_iter().next())
    }

    /// Get an environment by its API key.
    pub async fn get_environment(&self, environment_key: &str) -> Result<Environment, AppError> {
        self.get(&format!(
            "/environments/{}/",
            urlencoding::encode(environment_key)
        ))
        .await
    }

    /// Get the signed-in user's permissions in an environment.
    pub async fn get_environment_permissions(
        &self,
        environment_key: &str,
    ) -> Result<EnvironmentPermissions, AppError> {
        self.get(&format!(
            "/environments/{}/my-permissions/",
            urlencoding::encode(environment_key)
        ))
        .await
    }

    /// List users of an organisation.
    pub async fn list_organisation_users(
        &self,
        organisation_id: i64,
    ) -> Result<Vec<OrganisationUser>, AppError> {
        self.get(&format!("/organisations/{}/users/", organisation_id))
            .await
    }

    /// List all permission groups of an organisation.
    pub async fn list_organisation_groups(
        &self,
        organisation_id: i64,
    ) -> Result<Vec<UserGroup>, AppError> {
        self.get_all_pages(&format!("/organisations/{}/groups/", organisation_id))
            .await
    }
}
