use axum::routing::get;
use axum::Router;

use crate::handlers::concepts;
use crate::state::AppState;

/// Concept routes mounted at `/concepts`.
///
/// ```text
/// GET    /search        -> search_concepts
/// GET    /key/{key}     -> get_concept_by_key
/// GET    /{id}          -> get_concept
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/search", get(concepts::search_concepts))
        .route("/key/{key}", get(concepts::get_concept_by_key))
        .route("/{id}", get(concepts::get_concept))
}
