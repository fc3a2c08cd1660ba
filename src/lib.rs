//! Flag Console - change-request review for a feature-flag service.
//!
//! This library talks to the flag service admin API, keeps fetched change
//! requests in an observable store, evaluates approval and publish rules,
//! diffs proposed feature state against the live flag, and builds the view
//! models of the change-request pages.

pub mod error;
pub mod models;
pub mod pages;
pub mod services;
pub mod settings;

pub use error::AppError;
pub use settings::Settings;
