//! Handlers for annotation assembly: create, preprocess, concept range
//! edits, fetch and delete.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use glossa_core::annotation::Annotation;
use glossa_core::types::DbId;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body of `POST /annotation`; exactly one of `annotation` / `annotations`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnnotationRequest {
    pub object_id: DbId,
    pub annotation: Option<String>,
    pub annotations: Option<Vec<String>>,
    pub created_by: Option<DbId>,
    /// Drop invalid texts from a batch instead of failing it.
    #[serde(default)]
    pub skip_invalid: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRangeRequest {
    pub anno_id: DbId,
    pub token_start: usize,
    pub token_end: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessParams {
    pub annotation: String,
    pub label_id: DbId,
}

/// A single insert answers with the record, a batch with the list.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Created {
    One(Annotation),
    Many(Vec<Annotation>),
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

/// POST /api/v1/annotation
pub async fn create_annotation(
    State(state): State<AppState>,
    Json(input): Json<CreateAnnotationRequest>,
) -> AppResult<impl IntoResponse> {
    let created = match (input.annotation, input.annotations) {
        (Some(text), None) => Created::One(
            state
                .assembler
                .insert_annotation(input.object_id, &text, input.created_by)
                .await?,
        ),
        (None, Some(texts)) => Created::Many(
            state
                .assembler
                .insert_annotations(input.object_id, &texts, input.created_by, input.skip_invalid)
                .await?,
        ),
        (Some(_), Some(_)) => {
            return Err(AppError::BadRequest(
                "send either 'annotation' or 'annotations', not both".into(),
            ))
        }
        (None, None) => {
            return Err(AppError::BadRequest(
                "one of 'annotation' or 'annotations' is required".into(),
            ))
        }
    };

    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// PUT /api/v1/annotation
///
/// Marks `[tokenStart, tokenEnd)` as one concept. `data` is `null` when the
/// range holds no noun phrase; nothing is written in that case.
pub async fn update_concept_range(
    State(state): State<AppState>,
    Json(input): Json<UpdateRangeRequest>,
) -> AppResult<impl IntoResponse> {
    let updated = state
        .assembler
        .update_concept_at_range(input.anno_id, input.token_start, input.token_end)
        .await?;

    Ok(Json(DataResponse { data: updated }))
}

/// GET /api/v1/annotation/preprocess?annotation=&labelId=
///
/// Runs the assembler without writing the annotation.
pub async fn preprocess(
    State(state): State<AppState>,
    Query(params): Query<PreprocessParams>,
) -> AppResult<impl IntoResponse> {
    let preprocessed = state
        .assembler
        .preprocess(&params.annotation, params.label_id)
        .await?;

    Ok(Json(DataResponse { data: preprocessed }))
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// GET /api/v1/annotation/{id}
pub async fn get_annotation(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let annotation = state.assembler.get_annotation(id).await?;
    Ok(Json(DataResponse { data: annotation }))
}

/// DELETE /api/v1/annotation/{id}
pub async fn delete_annotation(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state.assembler.delete_annotation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
