use axum::routing::{get, post};
use axum::Router;

use crate::handlers::images;
use crate::state::AppState;

/// Image routes mounted at `/images`.
///
/// ```text
/// POST   /                  -> create_image
/// POST   /{id}/objects      -> add_object
/// GET    /{id}/priority     -> get_priority
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(images::create_image))
        .route("/{id}/objects", post(images::add_object))
        .route("/{id}/priority", get(images::get_priority))
}

/// Object routes mounted at `/objects`.
///
/// ```text
/// GET    /{id}              -> get_object
/// DELETE /{id}              -> delete_object
/// ```
pub fn object_router() -> Router<AppState> {
    Router::new().route("/{id}", get(images::get_object).delete(images::delete_object))
}
