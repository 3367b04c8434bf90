use axum::routing::{get, post};
use axum::Router;

use crate::handlers::labels;
use crate::state::AppState;

/// Label routes mounted at `/labels`.
///
/// ```text
/// POST   /                   -> create_label
/// GET    /categories/{name}  -> get_category
/// GET    /{id}               -> get_label
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(labels::create_label))
        .route("/categories/{name}", get(labels::get_category))
        .route("/{id}", get(labels::get_label))
}
