//! Statistics reads and forced recomputation.
//!
//! Reads serve cached aggregates while they are fresh; `?force=true`
//! recomputes first.

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use glossa_core::stats::AggregateKind;
use glossa_core::types::DbId;
use serde::Deserialize;

use crate::error::AppResult;
use crate::query::ReadParams;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecomputeRequest {
    /// Snake-case aggregate name, e.g. `concept_tf_idf`.
    pub kind: String,
    pub scope_id: DbId,
}

/// GET /api/v1/stats/concept/tfIdf/label/{labelId}/{page}
///
/// One zero-based page of the label's concepts ranked by TF-IDF.
pub async fn tf_idf(
    State(state): State<AppState>,
    Path((label_id, page)): Path<(DbId, i64)>,
    Query(params): Query<ReadParams>,
) -> AppResult<impl IntoResponse> {
    state.labels.get_label(label_id).await?;
    let scores = state
        .stats
        .tf_idf(label_id, page, state.config.tfidf_page_size, params.mode())
        .await?;

    Ok(Json(DataResponse { data: scores }))
}

/// GET /api/v1/stats/concept/{id}/occurrence
pub async fn concept_occurrence(
    State(state): State<AppState>,
    Path(concept_id): Path<DbId>,
    Query(params): Query<ReadParams>,
) -> AppResult<impl IntoResponse> {
    state.concepts.get(concept_id).await?;
    let occurrence = state
        .stats
        .concept_occurrences(&[concept_id], params.mode())
        .await?
        .pop();

    Ok(Json(DataResponse { data: occurrence }))
}

/// GET /api/v1/stats/label/{id}/counts
pub async fn label_counts(
    State(state): State<AppState>,
    Path(label_id): Path<DbId>,
    Query(params): Query<ReadParams>,
) -> AppResult<impl IntoResponse> {
    state.labels.get_label(label_id).await?;
    let counts = state
        .stats
        .label_concept_counts(label_id, params.mode())
        .await?;

    Ok(Json(DataResponse { data: counts }))
}

/// POST /api/v1/admin/stats/recompute
pub async fn recompute(
    State(state): State<AppState>,
    Json(input): Json<RecomputeRequest>,
) -> AppResult<impl IntoResponse> {
    let kind = AggregateKind::from_str(&input.kind)?;
    match kind {
        AggregateKind::ConceptLabelCount | AggregateKind::ConceptTfIdf => {
            state.labels.get_label(input.scope_id).await?;
        }
        AggregateKind::ConceptOccurrence => {
            state.concepts.get(input.scope_id).await?;
        }
        // Both reads report unknown scopes themselves.
        AggregateKind::ImagePriority | AggregateKind::ProjectProgress => {}
    }
    state.stats.recompute(kind, input.scope_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
