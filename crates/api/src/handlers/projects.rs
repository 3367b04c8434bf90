//! Handlers for projects: membership, weighted work fetch, progress and
//! worker history.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use glossa_core::error::CoreError;
use glossa_core::sampler::NewWorkEntry;
use glossa_core::types::DbId;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::query::ReadParams;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddImagesRequest {
    pub image_ids: Vec<DbId>,
}

#[derive(Debug, Serialize)]
pub struct AddImagesResponse {
    pub added: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandFetchParams {
    /// Exclude documents this worker already has an entry for.
    pub worker_id: Option<DbId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordWorkRequest {
    pub worker_id: DbId,
    pub doc_id: DbId,
    #[serde(default)]
    pub is_finished: bool,
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// POST /api/v1/projects
pub async fn create_project(
    State(state): State<AppState>,
    Json(input): Json<CreateProjectRequest>,
) -> AppResult<impl IntoResponse> {
    let project = state.images.create_project(&input.name).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: project })))
}

/// POST /api/v1/projects/{id}/images
pub async fn add_images(
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
    Json(input): Json<AddImagesRequest>,
) -> AppResult<impl IntoResponse> {
    let added = state
        .images
        .add_images_to_project(project_id, &input.image_ids)
        .await?;

    Ok(Json(DataResponse {
        data: AddImagesResponse { added },
    }))
}

/// GET /api/v1/projects/{id}/images
pub async fn list_images(
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let image_ids = state.images.project_images(project_id).await?;
    Ok(Json(DataResponse { data: image_ids }))
}

// ---------------------------------------------------------------------------
// Work assignment
// ---------------------------------------------------------------------------

/// GET /api/v1/project/{id}/randfetch/{n}?workerId=
///
/// Up to `n` member images, drawn with probability proportional to their
/// share of unannotated objects.
pub async fn rand_fetch(
    State(state): State<AppState>,
    Path((project_id, n)): Path<(DbId, usize)>,
    Query(params): Query<RandFetchParams>,
) -> AppResult<impl IntoResponse> {
    let max = state.config.max_sample_size;
    if n == 0 || n > max {
        return Err(CoreError::Validation(format!("n must be between 1 and {max}, got {n}")).into());
    }

    let mut rng = StdRng::from_os_rng();
    let docs = state
        .sampler
        .fetch(project_id, n, params.worker_id, &mut rng)
        .await?;

    Ok(Json(DataResponse { data: docs }))
}

/// GET /api/v1/project/{id}/progress
pub async fn get_progress(
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
    Query(params): Query<ReadParams>,
) -> AppResult<impl IntoResponse> {
    let progress = state.stats.project_progress(project_id, params.mode()).await?;
    Ok(Json(DataResponse { data: progress }))
}

/// POST /api/v1/project/{id}/work
///
/// Upserts the worker's entry for the document.
pub async fn record_work(
    State(state): State<AppState>,
    Path(project_id): Path<DbId>,
    Json(input): Json<RecordWorkRequest>,
) -> AppResult<impl IntoResponse> {
    let entry = state
        .sampler
        .record_work(&NewWorkEntry {
            worker_id: input.worker_id,
            doc_id: input.doc_id,
            project_id,
            is_finished: input.is_finished,
        })
        .await?;

    Ok(Json(DataResponse { data: entry }))
}
