//! Authentication module

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::warn;
use wacm_core::{CampaignScheduler, WebhookProcessor};
use wacm_storage::Store;

use crate::error::ApiError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub scheduler: Arc<CampaignScheduler>,
    pub webhook: Arc<WebhookProcessor>,
    /// Static API token; authentication is off when unset
    pub auth_token: Option<String>,
    /// Verify token used when the settings record has none
    pub webhook_verify_token: Option<String>,
    /// Secret for `X-Hub-Signature-256`; signatures are not checked when unset
    pub app_secret: Option<String>,
}

/// Extract API key from request
pub fn extract_api_key(req: &Request) -> Option<&str> {
    // Check Authorization header
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.trim());
            }
        }
    }

    // Check X-API-Key header
    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str.trim());
        }
    }

    None
}

fn hash_token(token: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Compare digests so the check does not leak a matching prefix
fn token_matches(presented: &str, expected: &str) -> bool {
    hash_token(presented) == hash_token(expected)
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.auth_token.as_deref().filter(|t| !t.is_empty()) else {
        return next.run(request).await;
    };

    let path = request.uri().path().to_string();
    match extract_api_key(&request) {
        Some(key) if token_matches(key, expected) => next.run(request).await,
        Some(_) => {
            warn!("Invalid API token in request to {}", path);
            ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", "Invalid API token")
                .into_response()
        }
        None => {
            warn!("Missing API token in request to {}", path);
            ApiError::new(StatusCode::UNAUTHORIZED, "unauthorized", "Missing API token")
                .into_response()
        }
    }
}
