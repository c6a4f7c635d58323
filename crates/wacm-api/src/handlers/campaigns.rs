//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use wacm_core::ScheduleOutcome;
use wacm_storage::models::{
    Campaign, CampaignStatus, CreateCampaign, Message, ScheduleDescriptor, ScheduleType,
    UpdateCampaign,
};

use super::ListResponse;
use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    pub status: Option<String>,
}

async fn load(state: &AppState, campaign_id: Uuid) -> ApiResult<Campaign> {
    state
        .store
        .get_campaign(campaign_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Campaign {} not found", campaign_id)))
}

async fn validate_references(
    state: &AppState,
    template_id: Uuid,
    schedule: &ScheduleDescriptor,
) -> ApiResult<()> {
    if state.store.get_template(template_id).await?.is_none() {
        return Err(ApiError::validation(format!(
            "Template {} does not exist",
            template_id
        )));
    }
    if schedule.schedule_type == ScheduleType::Scheduled && schedule.start_time.is_none() {
        return Err(ApiError::validation(
            "A scheduled campaign needs a start_time",
        ));
    }
    if schedule.schedule_type == ScheduleType::Recurring && schedule.recurrence.is_none() {
        return Err(ApiError::validation(
            "A recurring campaign needs a recurrence",
        ));
    }
    Ok(())
}

/// List campaigns
///
/// GET /api/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCampaignsQuery>,
) -> ApiResult<Json<ListResponse<Campaign>>> {
    let status = query
        .status
        .map(|s| s.parse::<CampaignStatus>())
        .transpose()
        .map_err(ApiError::validation)?;

    let campaigns = state.store.list_campaigns(status).await?;
    Ok(Json(campaigns.into()))
}

/// Create a campaign as a draft
///
/// POST /api/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateCampaign>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("Campaign name must not be empty"));
    }
    validate_references(&state, input.template_id, &input.schedule).await?;

    let campaign = state.store.create_campaign(input).await?;
    info!(campaign_id = %campaign.id, name = %campaign.name, "Campaign created");

    Ok((StatusCode::CREATED, Json(campaign)))
}

/// GET /api/campaigns/:id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<Campaign>> {
    Ok(Json(load(&state, campaign_id).await?))
}

/// Update a campaign. A `status` of `scheduled`, `paused` or `stopped`
/// registers, pauses or cancels the campaign's job.
///
/// PUT /api/campaigns/:id
pub async fn update_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    Json(update): Json<UpdateCampaign>,
) -> ApiResult<Json<Campaign>> {
    let mut campaign = load(&state, campaign_id).await?;
    update.apply_to(&mut campaign);
    if campaign.name.trim().is_empty() {
        return Err(ApiError::validation("Campaign name must not be empty"));
    }
    validate_references(&state, campaign.template_id, &campaign.schedule).await?;
    let campaign = state.store.update_campaign(campaign).await?;

    match update.status {
        None => {}
        Some(CampaignStatus::Scheduled) => {
            state.scheduler.schedule_from_record(&campaign).await?;
        }
        Some(CampaignStatus::Paused) => state.scheduler.pause_campaign(campaign_id).await?,
        Some(CampaignStatus::Stopped) => state.scheduler.cancel_campaign(campaign_id).await?,
        Some(CampaignStatus::Running) => {
            return Err(ApiError::validation(
                "Use the execute endpoint to run a campaign",
            ))
        }
        Some(status) => {
            state
                .store
                .update_campaign_status(campaign_id, status)
                .await?
        }
    }

    Ok(Json(load(&state, campaign_id).await?))
}

/// Delete a campaign and drop its job
///
/// DELETE /api/campaigns/:id
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    load(&state, campaign_id).await?;
    if state.scheduler.is_registered(campaign_id).await {
        state.scheduler.cancel_campaign(campaign_id).await?;
    }
    state.store.delete_campaign(campaign_id).await?;
    info!(%campaign_id, "Campaign deleted");

    Ok(StatusCode::NO_CONTENT)
}

/// Dispatch now and return the campaign with its run stats
///
/// POST /api/campaigns/:id/execute
pub async fn execute_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<Campaign>> {
    state
        .scheduler
        .schedule_immediate_campaign(campaign_id)
        .await?;
    Ok(Json(load(&state, campaign_id).await?))
}

/// Register the campaign per its schedule. A body replaces the stored
/// descriptor first.
///
/// POST /api/campaigns/:id/schedule
pub async fn schedule_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
    body: Option<Json<ScheduleDescriptor>>,
) -> ApiResult<Json<ScheduleOutcome>> {
    let mut campaign = load(&state, campaign_id).await?;
    if let Some(Json(schedule)) = body {
        validate_references(&state, campaign.template_id, &schedule).await?;
        campaign.schedule = schedule;
        campaign = state.store.update_campaign(campaign).await?;
    }

    let outcome = state.scheduler.schedule_from_record(&campaign).await?;
    Ok(Json(outcome))
}

/// POST /api/campaigns/:id/pause
pub async fn pause_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<Campaign>> {
    load(&state, campaign_id).await?;
    state.scheduler.pause_campaign(campaign_id).await?;
    Ok(Json(load(&state, campaign_id).await?))
}

/// POST /api/campaigns/:id/resume
pub async fn resume_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<ScheduleOutcome>> {
    Ok(Json(state.scheduler.resume_campaign(campaign_id).await?))
}

/// POST /api/campaigns/:id/cancel
pub async fn cancel_campaign(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<Campaign>> {
    state.scheduler.cancel_campaign(campaign_id).await?;
    Ok(Json(load(&state, campaign_id).await?))
}

/// Messages sent for a campaign
///
/// GET /api/campaigns/:id/messages
pub async fn campaign_messages(
    State(state): State<Arc<AppState>>,
    Path(campaign_id): Path<Uuid>,
) -> ApiResult<Json<ListResponse<Message>>> {
    load(&state, campaign_id).await?;
    let messages = state.store.list_messages(Some(campaign_id)).await?;
    Ok(Json(messages.into()))
}
