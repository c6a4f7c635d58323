//! Template handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use wacm_storage::models::{CreateTemplate, Template};

use super::ListResponse;
use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// GET /api/templates
pub async fn list_templates(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ListResponse<Template>>> {
    Ok(Json(state.store.list_templates().await?.into()))
}

/// Register a template approved on the provider side
///
/// POST /api/templates
pub async fn create_template(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateTemplate>,
) -> ApiResult<(StatusCode, Json<Template>)> {
    if input.external_name.trim().is_empty() {
        return Err(ApiError::validation("external_name must not be empty"));
    }
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("Template name must not be empty"));
    }

    let template = state.store.create_template(input).await?;
    Ok((StatusCode::CREATED, Json(template)))
}

/// GET /api/templates/:id
pub async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
) -> ApiResult<Json<Template>> {
    state
        .store
        .get_template(template_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Template {} not found", template_id)))
}

/// DELETE /api/templates/:id
pub async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(template_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.store.delete_template(template_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
