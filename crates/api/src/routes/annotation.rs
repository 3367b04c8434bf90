use axum::routing::{get, post};
use axum::Router;

use crate::handlers::annotation;
use crate::state::AppState;

/// Annotation routes mounted at `/annotation`.
///
/// ```text
/// POST   /              -> create_annotation
/// PUT    /              -> update_concept_range
/// GET    /preprocess    -> preprocess
/// GET    /{id}          -> get_annotation
/// DELETE /{id}          -> delete_annotation
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(annotation::create_annotation).put(annotation::update_concept_range),
        )
        .route("/preprocess", get(annotation::preprocess))
        .route(
            "/{id}",
            get(annotation::get_annotation).delete(annotation::delete_annotation),
        )
}
