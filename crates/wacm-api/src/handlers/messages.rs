//! Message log handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use wacm_storage::models::Message;

use super::ListResponse;
use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub campaign_id: Option<Uuid>,
}

/// GET /api/messages?campaign_id=
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListMessagesQuery>,
) -> ApiResult<Json<ListResponse<Message>>> {
    Ok(Json(state.store.list_messages(query.campaign_id).await?.into()))
}

/// GET /api/messages/:id
pub async fn get_message(
    State(state): State<Arc<AppState>>,
    Path(message_id): Path<Uuid>,
) -> ApiResult<Json<Message>> {
    state
        .store
        .get_message(message_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Message {} not found", message_id)))
}
