//! Bot rule handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use wacm_core::bot::{compile_trigger, explain, select_rule, MatchExplanation};
use wacm_storage::models::{BotRule, CreateBotRule, ReplyType, TriggerType, UpdateBotRule};

use super::ListResponse;
use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// Request body for the rule tester
#[derive(Debug, Deserialize)]
pub struct TestBotRuleRequest {
    pub message: String,
}

/// Which rule would answer a message. Nothing is sent.
#[derive(Debug, Serialize)]
pub struct TestBotRuleResponse {
    pub matched: bool,
    pub rule: Option<BotRule>,
    pub explanation: MatchExplanation,
}

/// Reject rules the matcher could never use
fn validate_rule(
    name: &str,
    trigger_type: TriggerType,
    triggers: &[String],
    reply_type: ReplyType,
    reply_content: &str,
) -> ApiResult<()> {
    if name.trim().is_empty() {
        return Err(ApiError::validation("Rule name must not be empty"));
    }
    if triggers.is_empty() || triggers.iter().any(|t| t.trim().is_empty()) {
        return Err(ApiError::validation(
            "Triggers must be a non-empty list of non-empty strings",
        ));
    }
    if trigger_type == TriggerType::Regex {
        for trigger in triggers {
            compile_trigger(trigger).map_err(|e| {
                ApiError::validation(format!("Invalid regex trigger '{}': {}", trigger, e))
            })?;
        }
    }
    if reply_content.trim().is_empty() {
        return Err(ApiError::validation("Reply content must not be empty"));
    }
    if reply_type == ReplyType::Template && Uuid::parse_str(reply_content.trim()).is_err() {
        return Err(ApiError::validation(
            "A template reply must reference a template id",
        ));
    }
    Ok(())
}

async fn load(state: &AppState, rule_id: Uuid) -> ApiResult<BotRule> {
    state
        .store
        .get_bot_rule(rule_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Bot rule {} not found", rule_id)))
}

/// GET /api/bot-rules
pub async fn list_bot_rules(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ListResponse<BotRule>>> {
    Ok(Json(state.store.list_bot_rules().await?.into()))
}

/// POST /api/bot-rules
pub async fn create_bot_rule(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateBotRule>,
) -> ApiResult<(StatusCode, Json<BotRule>)> {
    validate_rule(
        &input.name,
        input.trigger_type,
        &input.triggers,
        input.reply_type,
        &input.reply_content,
    )?;

    let rule = state.store.create_bot_rule(input).await?;
    info!(rule_id = %rule.id, name = %rule.name, "Bot rule created");

    Ok((StatusCode::CREATED, Json(rule)))
}

/// GET /api/bot-rules/:id
pub async fn get_bot_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
) -> ApiResult<Json<BotRule>> {
    Ok(Json(load(&state, rule_id).await?))
}

/// PUT /api/bot-rules/:id
pub async fn update_bot_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
    Json(update): Json<UpdateBotRule>,
) -> ApiResult<Json<BotRule>> {
    let mut rule = load(&state, rule_id).await?;
    update.apply_to(&mut rule);
    validate_rule(
        &rule.name,
        rule.trigger_type,
        &rule.triggers,
        rule.reply_type,
        &rule.reply_content,
    )?;

    Ok(Json(state.store.update_bot_rule(rule).await?))
}

/// DELETE /api/bot-rules/:id
pub async fn delete_bot_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.store.delete_bot_rule(rule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Flip the rule's active flag
///
/// POST /api/bot-rules/:id/toggle
pub async fn toggle_bot_rule(
    State(state): State<Arc<AppState>>,
    Path(rule_id): Path<Uuid>,
) -> ApiResult<Json<BotRule>> {
    let mut rule = load(&state, rule_id).await?;
    rule.active = !rule.active;
    let rule = state.store.update_bot_rule(rule).await?;
    info!(rule_id = %rule.id, active = rule.active, "Bot rule toggled");

    Ok(Json(rule))
}

/// POST /api/bot-rules/test
pub async fn test_bot_rules(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TestBotRuleRequest>,
) -> ApiResult<Json<TestBotRuleResponse>> {
    let rules = state.store.list_bot_rules().await?;
    let rule = select_rule(&request.message, &rules).cloned();

    Ok(Json(TestBotRuleResponse {
        matched: rule.is_some(),
        explanation: explain(&request.message, &rules),
        rule,
    }))
}
