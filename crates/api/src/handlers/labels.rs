use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use glossa_core::types::DbId;
use serde::Deserialize;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateLabelRequest {
    pub name: String,
    #[serde(default)]
    pub categories: Vec<String>,
}

/// POST /api/v1/labels
pub async fn create_label(
    State(state): State<AppState>,
    Json(input): Json<CreateLabelRequest>,
) -> AppResult<impl IntoResponse> {
    let label = state
        .labels
        .create_label(&input.name, &input.categories)
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: label })))
}

/// GET /api/v1/labels/categories/{name}
///
/// `data` is `null` when no label uses the category.
pub async fn get_category(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<impl IntoResponse> {
    let category = state.labels.get_category(&name).await?;
    Ok(Json(DataResponse { data: category }))
}

/// GET /api/v1/labels/{id}
pub async fn get_label(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let label = state.labels.get_label(id).await?;
    Ok(Json(DataResponse { data: label }))
}
