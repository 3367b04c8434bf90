use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use glossa_core::image::{BoundingBox, NewImage, NewObject};
use glossa_core::stats::ImagePriority;
use glossa_core::types::DbId;
use serde::Deserialize;

use crate::error::AppResult;
use crate::query::ReadParams;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddObjectRequest {
    pub label_id: DbId,
    pub bbox: BoundingBox,
}

/// POST /api/v1/images
pub async fn create_image(
    State(state): State<AppState>,
    Json(input): Json<NewImage>,
) -> AppResult<impl IntoResponse> {
    let image = state.images.create_image(&input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: image })))
}

/// POST /api/v1/images/{id}/objects
pub async fn add_object(
    State(state): State<AppState>,
    Path(image_id): Path<DbId>,
    Json(input): Json<AddObjectRequest>,
) -> AppResult<impl IntoResponse> {
    let object = state
        .images
        .add_object(&NewObject {
            image_id,
            label_id: input.label_id,
            bbox: input.bbox,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: object })))
}

/// GET /api/v1/images/{id}/priority
pub async fn get_priority(
    State(state): State<AppState>,
    Path(image_id): Path<DbId>,
    Query(params): Query<ReadParams>,
) -> AppResult<impl IntoResponse> {
    let priority = state.stats.image_priority(image_id, params.mode()).await?;
    Ok(Json(DataResponse {
        data: ImagePriority { image_id, priority },
    }))
}

/// GET /api/v1/objects/{id}
pub async fn get_object(
    State(state): State<AppState>,
    Path(object_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let object = state.images.get_object(object_id).await?;
    Ok(Json(DataResponse { data: object }))
}

/// DELETE /api/v1/objects/{id}
///
/// Removes the object and its annotations.
pub async fn delete_object(
    State(state): State<AppState>,
    Path(object_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    state.images.delete_object(object_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
