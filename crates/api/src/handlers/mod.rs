//! Request handlers.
//!
//! Each submodule provides async handler functions for one resource.
//! Handlers delegate to the services in [`AppState`](crate::state::AppState)
//! and map errors via [`AppError`](crate::error::AppError).

pub mod annotation;
pub mod concepts;
pub mod images;
pub mod labels;
pub mod projects;
pub mod stats;
