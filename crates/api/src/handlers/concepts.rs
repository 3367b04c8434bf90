//! Concept lookups: by id, by canonical key and by lemma overlap.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use glossa_core::concept::DEFAULT_RELEVANCE_LIMIT;
use glossa_core::types::DbId;
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

const MAX_SEARCH_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub limit: Option<i64>,
}

/// GET /api/v1/concepts/{id}
pub async fn get_concept(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let concept = state.concepts.get(id).await?;
    Ok(Json(DataResponse { data: concept }))
}

/// GET /api/v1/concepts/key/{key}
///
/// `data` is `null` when no concept has the key.
pub async fn get_concept_by_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> AppResult<impl IntoResponse> {
    let concept = state.concepts.find_by_key(&key).await?;
    Ok(Json(DataResponse { data: concept }))
}

/// GET /api/v1/concepts/search?q=&limit=
///
/// Concepts sharing lemma indices with the query phrase, most shared first.
pub async fn search_concepts(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> AppResult<impl IntoResponse> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_RELEVANCE_LIMIT)
        .clamp(1, MAX_SEARCH_LIMIT);
    let matches = state
        .concepts
        .search(state.analyzer.as_ref(), &params.q, limit)
        .await?;

    Ok(Json(DataResponse { data: matches }))
}
