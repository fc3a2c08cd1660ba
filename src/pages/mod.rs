//! Page view models and routing.
//!
//! Pages read from the [`ChangeRequestStore`](crate::services::ChangeRequestStore)
//! and build plain view structs; the rendering layer draws them.

pub mod change_request_detail;
pub mod change_request_list;
pub mod routes;

pub use change_request_detail::{
    ChangeRequestDetailPage, ControlState, DetailState, DetailView, DiffView, Member, PageContext,
};
pub use change_request_list::{ChangeRequestListPage, ChangeRequestRow, ListView, Pagination};
pub use routes::Route;
