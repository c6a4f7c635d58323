//! WhatsApp account settings handlers

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use wacm_common::types::mask_secret;
use wacm_storage::models::Settings;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// Settings as shown to clients, with the access token masked
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub configured: bool,
    pub phone_number_id: String,
    pub access_token: String,
    pub business_account_id: Option<String>,
    pub webhook_verify_token: Option<String>,
}

impl From<Settings> for SettingsResponse {
    fn from(s: Settings) -> Self {
        Self {
            configured: s.has_credentials(),
            access_token: mask_secret(&s.access_token),
            phone_number_id: s.phone_number_id,
            business_account_id: s.business_account_id,
            webhook_verify_token: s.webhook_verify_token,
        }
    }
}

/// Request body for updating settings. An omitted token keeps the stored one.
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub phone_number_id: String,
    pub access_token: Option<String>,
    pub business_account_id: Option<String>,
    pub webhook_verify_token: Option<String>,
}

/// GET /api/settings
pub async fn get_settings(State(state): State<Arc<AppState>>) -> ApiResult<Json<SettingsResponse>> {
    let settings = state.store.get_settings().await?.unwrap_or_default();
    Ok(Json(settings.into()))
}

/// PUT /api/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateSettingsRequest>,
) -> ApiResult<Json<SettingsResponse>> {
    if request.phone_number_id.trim().is_empty() {
        return Err(ApiError::validation("phone_number_id must not be empty"));
    }

    let current = state.store.get_settings().await?.unwrap_or_default();
    let access_token = request
        .access_token
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(current.access_token);
    if access_token.is_empty() {
        return Err(ApiError::validation("access_token must not be empty"));
    }

    let settings = state
        .store
        .put_settings(Settings {
            phone_number_id: request.phone_number_id.trim().to_string(),
            access_token,
            business_account_id: request.business_account_id,
            webhook_verify_token: request.webhook_verify_token,
        })
        .await?;
    info!(phone_number_id = %settings.phone_number_id, "WhatsApp settings updated");

    Ok(Json(settings.into()))
}
