pub mod admin;
pub mod annotation;
pub mod concepts;
pub mod health;
pub mod images;
pub mod labels;
pub mod projects;
pub mod stats;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /annotation                                      create (POST), concept range (PUT)
/// /annotation/preprocess                           assemble without writing (GET)
/// /annotation/{id}                                 get, delete
///
/// /labels                                          create (POST)
/// /labels/{id}                                     get
/// /labels/categories/{name}                        category by name
///
/// /concepts/{id}                                   get
/// /concepts/key/{key}                              lookup by canonical key
/// /concepts/search                                 lemma-overlap search (?q=&limit=)
///
/// /projects                                        create (POST)
/// /projects/{id}/images                            list, add member images (POST)
/// /project/{id}/randfetch/{n}                      weighted work fetch (?workerId=)
/// /project/{id}/progress                           project progress
/// /project/{id}/work                               record work entry (POST)
///
/// /images                                          create (POST)
/// /images/{id}/objects                             add object (POST)
/// /images/{id}/priority                            image priority
/// /objects/{id}                                    get, delete
///
/// /stats/concept/tfIdf/label/{labelId}/{page}      TF-IDF ranking page
/// /stats/concept/{id}/occurrence                   labels using a concept
/// /stats/label/{id}/counts                         concept counts for a label
///
/// /admin/stats/recompute                           force recompute (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/annotation", annotation::router())
        .nest("/labels", labels::router())
        .nest("/concepts", concepts::router())
        .nest("/projects", projects::router())
        .nest("/project", projects::work_router())
        .nest("/images", images::router())
        .nest("/objects", images::object_router())
        .nest("/stats", stats::router())
        .nest("/admin", admin::router())
}
