//! WhatsApp webhook handlers

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};
use wacm_core::webhook::{
    verify_challenge, verify_signature, VerificationQuery, WebhookPayload, SIGNATURE_HEADER,
};
use wacm_core::WebhookSummary;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// Subscription handshake
///
/// GET /api/webhook/whatsapp
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VerificationQuery>,
) -> ApiResult<String> {
    let stored = state
        .store
        .get_settings()
        .await?
        .and_then(|s| s.webhook_verify_token)
        .filter(|t| !t.is_empty());
    let expected = stored.or_else(|| state.webhook_verify_token.clone());

    match verify_challenge(&query, expected.as_deref()) {
        Some(challenge) => {
            info!("Webhook subscription verified");
            Ok(challenge)
        }
        None => {
            warn!("Webhook verification rejected");
            Err(ApiError::new(
                StatusCode::FORBIDDEN,
                "forbidden",
                "Verification token mismatch",
            ))
        }
    }
}

/// Notification delivery
///
/// POST /api/webhook/whatsapp
pub async fn receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookSummary>> {
    if let Some(secret) = state.app_secret.as_deref().filter(|s| !s.is_empty()) {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(secret, &body, signature) {
            warn!("Webhook signature mismatch");
            return Err(ApiError::new(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid webhook signature",
            ));
        }
    }

    let payload: WebhookPayload = serde_json::from_slice(&body).map_err(|e| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            "invalid_payload",
            format!("Invalid webhook payload: {}", e),
        )
    })?;

    Ok(Json(state.webhook.process(&payload).await))
}
