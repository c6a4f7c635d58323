//! API routes

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::auth::{auth_middleware, AppState};
use crate::handlers::{
    bot_rules, campaigns, contacts, health, messages, settings, templates, webhook,
};

/// CORS for the configured origins; any origin when none are listed
fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(allowed)
}

/// Create the API router
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    let state = Arc::new(state);

    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .route("/detailed", get(health::health_detailed))
        .with_state(state.clone());

    // Webhook routes (called by the provider, no API token)
    let webhook_routes = Router::new()
        .route("/whatsapp", get(webhook::verify).post(webhook::receive))
        .with_state(state.clone());

    // Campaign routes
    let campaign_routes = Router::new()
        .route(
            "/",
            get(campaigns::list_campaigns).post(campaigns::create_campaign),
        )
        .route(
            "/:id",
            get(campaigns::get_campaign)
                .put(campaigns::update_campaign)
                .delete(campaigns::delete_campaign),
        )
        .route("/:id/execute", post(campaigns::execute_campaign))
        .route("/:id/schedule", post(campaigns::schedule_campaign))
        .route("/:id/pause", post(campaigns::pause_campaign))
        .route("/:id/resume", post(campaigns::resume_campaign))
        .route("/:id/cancel", post(campaigns::cancel_campaign))
        .route("/:id/messages", get(campaigns::campaign_messages));

    // Bot rule routes
    let bot_rule_routes = Router::new()
        .route(
            "/",
            get(bot_rules::list_bot_rules).post(bot_rules::create_bot_rule),
        )
        .route("/test", post(bot_rules::test_bot_rules))
        .route(
            "/:id",
            get(bot_rules::get_bot_rule)
                .put(bot_rules::update_bot_rule)
                .delete(bot_rules::delete_bot_rule),
        )
        .route("/:id/toggle", post(bot_rules::toggle_bot_rule));

    // Contact routes
    let contact_routes = Router::new()
        .route(
            "/",
            get(contacts::list_contacts).post(contacts::create_contact),
        )
        .route("/:id", get(contacts::get_contact));

    // Template routes
    let template_routes = Router::new()
        .route(
            "/",
            get(templates::list_templates).post(templates::create_template),
        )
        .route(
            "/:id",
            get(templates::get_template).delete(templates::delete_template),
        );

    // Message routes
    let message_routes = Router::new()
        .route("/", get(messages::list_messages))
        .route("/:id", get(messages::get_message));

    // API routes with authentication
    let api = Router::new()
        .nest("/campaigns", campaign_routes)
        .nest("/bot-rules", bot_rule_routes)
        .nest("/contacts", contact_routes)
        .nest("/templates", template_routes)
        .nest("/messages", message_routes)
        .route(
            "/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    // Combine all routes
    Router::new()
        .nest("/health", health_routes)
        .nest("/api/webhook", webhook_routes)
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origins)),
        )
}
