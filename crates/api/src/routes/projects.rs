//! Route definitions for projects.
//!
//! Two routers are provided:
//! - `router()` for project management mounted at `/projects`
//! - `work_router()` for work assignment mounted at `/project`

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::projects;
use crate::state::AppState;

/// Project management routes mounted at `/projects`.
///
/// ```text
/// POST   /                  -> create_project
/// GET    /{id}/images       -> list_images
/// POST   /{id}/images       -> add_images
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(projects::create_project))
        .route(
            "/{id}/images",
            get(projects::list_images).post(projects::add_images),
        )
}

/// Work assignment routes mounted at `/project`.
///
/// ```text
/// GET    /{id}/randfetch/{n}   -> rand_fetch
/// GET    /{id}/progress        -> get_progress
/// POST   /{id}/work            -> record_work
/// ```
pub fn work_router() -> Router<AppState> {
    Router::new()
        .route("/{id}/randfetch/{n}", get(projects::rand_fetch))
        .route("/{id}/progress", get(projects::get_progress))
        .route("/{id}/work", post(projects::record_work))
}
