//! Contact handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use wacm_common::types::normalize_phone;
use wacm_storage::models::{Contact, CreateContact};

use super::ListResponse;
use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// GET /api/contacts
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ListResponse<Contact>>> {
    Ok(Json(state.store.list_contacts().await?.into()))
}

/// POST /api/contacts
pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateContact>,
) -> ApiResult<(StatusCode, Json<Contact>)> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("Contact name must not be empty"));
    }
    if normalize_phone(&input.phone).is_empty() {
        return Err(ApiError::validation("Contact phone must contain digits"));
    }
    if state.store.find_contact_by_phone(&input.phone).await?.is_some() {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "conflict",
            format!("A contact with phone {} already exists", input.phone),
        ));
    }

    let contact = state.store.create_contact(input).await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

/// GET /api/contacts/:id
pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    Path(contact_id): Path<Uuid>,
) -> ApiResult<Json<Contact>> {
    state
        .store
        .get_contact(contact_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Contact {} not found", contact_id)))
}
