//! Page routing table.
//!
//! Paths are scoped to a project and an environment:
//!
//! ```text
//! /project/{project}/environment/{environment}/change-requests
//! /project/{project}/environment/{environment}/change-requests/{id}
//! /project/{project}/environment/{environment}/scheduled-changes
//! /project/{project}/environment/{environment}/scheduled-changes/{id}
//! /project/{project}/environment/{environment}/features
//! ```

use crate::services::store_events::ListBucket;
use serde::Serialize;
use std::fmt;

/// A page of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "page", rename_all = "snake_case")]
pub enum Route {
    ChangeRequests {
        project_id: i64,
        environment: String,
    },
    ChangeRequest {
        project_id: i64,
        environment: String,
        id: i64,
    },
    ScheduledChanges {
        project_id: i64,
        environment: String,
    },
    ScheduledChange {
        project_id: i64,
        environment: String,
        id: i64,
    },
    Features {
        project_id: i64,
        environment: String,
    },
    NotFound,
}

impl Route {
    /// Parse a path. Query strings and fragments are ignored; anything that
    /// does not match a page is [`Route::NotFound`].
    pub fn parse(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let ["project", project, "environment", environment, rest @ ..] = segments.as_slice()
        else {
            return Self::NotFound;
        };
        let Ok(project_id) = project.parse::<i64>() else {
            return Self::NotFound;
        };
        let environment = match urlencoding::decode(environment) {
            Ok(e) => e.into_owned(),
            Err(_) => return Self::NotFound,
        };

        match rest {
            ["change-requests"] => Self::ChangeRequests {
                project_id,
                environment,
            },
            ["change-requests", id] => match id.parse() {
                Ok(id) => Self::ChangeRequest {
                    project_id,
                    environment,
                    id,
                },
                Err(_) => Self::NotFound,
            },
            ["scheduled-changes"] => Self::ScheduledChanges {
                project_id,
                environment,
            },
            ["scheduled-changes", id] => match id.parse() {
                Ok(id) => Self::ScheduledChange {
                    project_id,
                    environment,
                    id,
                },
                Err(_) => Self::NotFound,
            },
            ["features"] => Self::Features {
                project_id,
                environment,
            },
            _ => Self::NotFound,
        }
    }

    /// List page showing `bucket`.
    pub fn list(project_id: i64, environment: impl Into<String>, bucket: ListBucket) -> Self {
        let environment = environment.into();
        match bucket {
            ListBucket::Open | ListBucket::Committed => Self::ChangeRequests {
                project_id,
                environment,
            },
            ListBucket::Scheduled => Self::ScheduledChanges {
                project_id,
                environment,
            },
        }
    }

    /// Detail page of change request `id`, reached from a `bucket` list.
    pub fn detail(
        project_id: i64,
        environment: impl Into<String>,
        bucket: ListBucket,
        id: i64,
    ) -> Self {
        let environment = environment.into();
        match bucket {
            ListBucket::Open | ListBucket::Committed => Self::ChangeRequest {
                project_id,
                environment,
                id,
            },
            ListBucket::Scheduled => Self::ScheduledChange {
                project_id,
                environment,
                id,
            },
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = |project_id: &i64, environment: &str| {
            format!(
                "/project/{}/environment/{}",
                project_id,
                urlencoding::encode(environment)
            )
        };

        match self {
            Self::ChangeRequests {
                project_id,
                environment,
            } => write!(f, "{}/change-requests", scope(project_id, environment)),
            Self::ChangeRequest {
                project_id,
                environment,
                id,
            } => write!(f, "{}/change-requests/{}", scope(project_id, environment), id),
            Self::ScheduledChanges {
                project_id,
                environment,
            } => write!(f, "{}/scheduled-changes", scope(project_id, environment)),
            Self::ScheduledChange {
                project_id,
                environment,
                id,
            } => write!(f, "{}/scheduled-changes/{}", scope(project_id, environment), id),
            Self::Features {
                project_id,
                environment,
            } => write!(f, "{}/features", scope(project_id, environment)),
            Self::NotFound => write!(f, "/404"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pages() {
        assert_eq!(
            Route::parse("/project/3/environment/abc/change-requests"),
            Route::ChangeRequests {
                project_id: 3,
                environment: "abc".to_string()
            }
        );
        assert_eq!(
            Route::parse("/project/3/environment/abc/scheduled-changes/12/"),
            Route::ScheduledChange {
                project_id: 3,
                environment: "abc".to_string(),
                id: 12
            }
        );
        assert_eq!(
            Route::parse("/project/3/environment/abc/features?tab=all"),
            Route::Features {
                project_id: 3,
                environment: "abc".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_paths() {
        for path in [
            "/",
            "/project/x/environment/abc/change-requests",
            "/project/3/environment/abc/change-requests/seven",
            "/project/3/environment/abc/audit-log",
            "/organisation/3/users",
        ] {
            assert_eq!(Route::parse(path), Route::NotFound, "{}", path);
        }
    }

    #[test]
    fn test_display_parses_back() {
        let routes = [
            Route::ChangeRequest {
                project_id: 1,
                environment: "env key".to_string(),
                id: 9,
            },
            Route::ScheduledChanges {
                project_id: 1,
                environment: "k".to_string(),
            },
            Route::Features {
                project_id: 2,
                environment: "k".to_string(),
            },
        ];
        for route in routes {
            assert_eq!(Route::parse(&route.to_string()), route);
        }
    }

    #[test]
    fn test_detail_route_follows_bucket() {
        assert_eq!(
            Route::detail(1, "k", ListBucket::Scheduled, 4).to_string(),
            "/project/1/environment/k/scheduled-changes/4"
        );
        assert_eq!(
            Route::list(1, "k", ListBucket::Committed).to_string(),
            "/project/1/environment/k/change-requests"
        );
    }
}
