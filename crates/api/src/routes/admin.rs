use axum::routing::post;
use axum::Router;

use crate::handlers::stats;
use crate::state::AppState;

/// Admin routes mounted at `/admin`.
///
/// ```text
/// POST   /stats/recompute   -> recompute
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/stats/recompute", post(stats::recompute))
}
