//! Change-request list page.

use crate::error::AppError;
use crate::models::{ChangeRequest, ChangeRequestStatus, OrganisationUser};
use crate::pages::routes::Route;
use crate::services::approval_rules;
use crate::services::change_request_store::{ChangeRequestList, ChangeRequestStore, PageRequest};
use crate::services::remote::ChangeRequestApi;
use crate::services::store_events::{ListBucket, ListKey};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// One row of the list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRequestRow {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub status: ChangeRequestStatus,
    pub live_from: Option<DateTime<Utc>>,
    pub route: Route,
}

/// Pagination controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub page_count: u32,
    pub count: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

impl Pagination {
    fn new(list: &ChangeRequestList, page_size: u32) -> Self {
        Self {
            page: list.page,
            page_count: list.count.div_ceil(page_size.max(1)).max(1),
            count: list.count,
            has_next: list.next.is_some(),
            has_previous: list.previous.is_some(),
        }
    }
}

/// What the list page renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListView {
    pub rows: Vec<ChangeRequestRow>,
    pub pagination: Option<Pagination>,
    pub loading: bool,
    pub failed: bool,
}

/// Name shown for a user ID.
pub(crate) fn author_name(users: &[OrganisationUser], user_id: i64) -> String {
    users
        .iter()
        .find(|u| u.id == user_id)
        .map(|u| u.display_name())
        .unwrap_or_else(|| format!("User {}", user_id))
}

/// List page for one environment and bucket.
pub struct ChangeRequestListPage<A> {
    store: ChangeRequestStore<A>,
    project_id: i64,
    environment: String,
    bucket: ListBucket,
    users: Vec<OrganisationUser>,
}

impl<A: ChangeRequestApi> ChangeRequestListPage<A> {
    pub fn new(
        store: ChangeRequestStore<A>,
        project_id: i64,
        environment: impl Into<String>,
        bucket: ListBucket,
    ) -> Self {
        Self {
            store,
            project_id,
            environment: environment.into(),
            bucket,
            users: Vec::new(),
        }
    }

    /// Users used to resolve author names.
    pub fn with_users(mut self, users: Vec<OrganisationUser>) -> Self {
        self.users = users;
        self
    }

    pub fn key(&self) -> ListKey {
        ListKey::new(self.environment.clone(), self.bucket)
    }

    pub fn route(&self) -> Route {
        Route::list(self.project_id, self.environment.clone(), self.bucket)
    }

    /// Load the first page.
    pub async fn load(&self) -> Result<(), AppError> {
        self.store
            .fetch_list(&self.environment, self.bucket, PageRequest::First)
            .await
            .map(|_| ())
    }

    /// Go to the next page. Returns `false` if there is none.
    pub async fn next(&self) -> Result<bool, AppError> {
        let next = self.current().and_then(|list| list.next);
        self.follow(next).await
    }

    /// Go to the previous page. Returns `false` if there is none.
    pub async fn previous(&self) -> Result<bool, AppError> {
        let previous = self.current().and_then(|list| list.previous);
        self.follow(previous).await
    }

    /// Jump to page `page`.
    pub async fn go_to_page(&self, page: u32) -> Result<(), AppError> {
        if page == 0 {
            return Err(AppError::invalid_input_field("Pages start at 1", "page"));
        }
        self.store
            .fetch_list(&self.environment, self.bucket, PageRequest::Number(page))
            .await
            .map(|_| ())
    }

    async fn follow(&self, url: Option<String>) -> Result<bool, AppError> {
        let Some(url) = url else {
            return Ok(false);
        };
        self.store
            .fetch_list(&self.environment, self.bucket, PageRequest::Url(url))
            .await?;
        Ok(true)
    }

    fn current(&self) -> Option<ChangeRequestList> {
        self.store.snapshot().list(&self.key()).cloned()
    }

    /// Build the view from the current store state.
    pub fn view(&self) -> ListView {
        let snapshot = self.store.snapshot();
        let key = self.key();
        let now = self.store.now();
        let list = snapshot.list(&key);

        ListView {
            rows: list
                .map(|l| l.results.iter().map(|cr| self.row(cr, now)).collect())
                .unwrap_or_default(),
            pagination: list.map(|l| Pagination::new(l, self.store.page_size())),
            loading: snapshot.is_loading(),
            failed: snapshot.list_failed(&key),
        }
    }

    fn row(&self, change_request: &ChangeRequest, now: DateTime<Utc>) -> ChangeRequestRow {
        ChangeRequestRow {
            id: change_request.id,
            title: change_request.title.clone(),
            author: author_name(&self.users, change_request.user),
            created_at: change_request.created_at,
            status: approval_rules::status(change_request, now),
            live_from: change_request.live_from(),
            route: Route::detail(
                self.project_id,
                self.environment.clone(),
                self.bucket,
                change_request.id,
            ),
        }
    }
}
