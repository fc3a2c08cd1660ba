//! Application settings.
//!
//! Settings are stored as a JSON file. Connection values can be overridden
//! from the environment so credentials need not be written to disk.

use crate::error::AppError;
use crate::services::api_client::ApiClientConfig;
use crate::services::change_request_store::DEFAULT_PAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding the API base URL.
pub const ENV_API_URL: &str = "FLAG_CONSOLE_API_URL";

/// Environment variable overriding the API token.
pub const ENV_API_TOKEN: &str = "FLAG_CONSOLE_API_TOKEN";

/// Environment variable overriding the organisation ID.
pub const ENV_ORGANISATION: &str = "FLAG_CONSOLE_ORGANISATION";

/// Application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// API connection.
    pub api: ApiClientConfig,

    /// Organisation whose users and groups can be assigned.
    pub organisation_id: Option<i64>,

    /// Change requests per list page.
    pub page_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api: ApiClientConfig::default(),
            organisation_id: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Settings {
    /// Load settings from `path`, using defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents).map_err(|e| {
            AppError::configuration(format!("Invalid settings file {}: {}", path.display(), e))
        })?;
        Ok(settings)
    }

    /// Write settings to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        log::info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), AppError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from `lookup`. Empty values are ignored.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), AppError> {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = lookup(ENV_API_URL) {
            self.api.base_url = url;
        }
        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.api.token = token;
        }
        if let Some(organisation) = lookup(ENV_ORGANISATION) {
            let id = organisation.trim().parse().map_err(|_| {
                AppError::configuration(format!(
                    "{} must be a numeric organisation ID, got '{}'",
                    ENV_ORGANISATION, organisation
                ))
            })?;
            self.organisation_id = Some(id);
        }

        Ok(())
    }

    /// Organisation whose users and groups the detail page loads.
    pub fn require_organisation_id(&self) -> Result<i64, AppError> {
        self.organisation_id.ok_or_else(|| {
            AppError::configuration(format!(
                "Organisation is not set; set {} or add it to the settings file",
                ENV_ORGANISATION
            ))
        })
    }

    /// Check that the settings are usable.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.api.base_url.trim().is_empty() {
            return Err(AppError::configuration("API base URL is not set"));
        }
        if self.page_size == 0 {
            return Err(AppError::configuration("Page size must be at least 1"));
        }
        Ok(())
    }
}
