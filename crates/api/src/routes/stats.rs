use axum::routing::get;
use axum::Router;

use crate::handlers::stats;
use crate::state::AppState;

/// Statistics routes mounted at `/stats`.
///
/// ```text
/// GET    /concept/tfIdf/label/{label_id}/{page}   -> tf_idf
/// GET    /concept/{id}/occurrence                 -> concept_occurrence
/// GET    /label/{id}/counts                       -> label_counts
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/concept/tfIdf/label/{label_id}/{page}", get(stats::tf_idf))
        .route("/concept/{id}/occurrence", get(stats::concept_occurrence))
        .route("/label/{id}/counts", get(stats::label_counts))
}
