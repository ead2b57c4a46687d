use axum::{extract::State, http::StatusCode};
use uuid::Uuid;

use crate::analytics;
use crate::api::extract::{Json, Path, Query};
use crate::api::AppState;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::models::*;

pub async fn list(
    State(db): State<Database>,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<Vec<Campaign>>> {
    db.list_campaigns(&query).map(Json)
}

pub async fn get(State(db): State<Database>, Path(id): Path<Uuid>) -> Result<Json<Campaign>> {
    db.get_campaign(id)?
        .map(Json)
        .ok_or(Error::NotFound("Campaign"))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateCampaignInput>,
) -> Result<(StatusCode, Json<Campaign>)> {
    let campaign = state.db.create_campaign(input)?;
    state.events.emit(EventKind::CampaignCreated, &campaign).await;
    Ok((StatusCode::CREATED, Json(campaign)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateCampaignInput>,
) -> Result<Json<Campaign>> {
    let campaign = state
        .db
        .update_campaign(id, input)?
        .ok_or(Error::NotFound("Campaign"))?;
    state.events.emit(EventKind::CampaignUpdated, &campaign).await;
    Ok(Json(campaign))
}

pub async fn launch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignLaunch>> {
    let launch = state.db.launch_campaign(id, &state.config.simulator)?;
    state.events.emit(EventKind::CampaignLaunched, &launch).await;
    Ok(Json(launch))
}

pub async fn pause(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Campaign>> {
    let campaign = state.db.pause_campaign(id)?;
    state.events.emit(EventKind::CampaignPaused, &campaign).await;
    Ok(Json(campaign))
}

pub async fn resume(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Campaign>> {
    let campaign = state.db.resume_campaign(id)?;
    state.events.emit(EventKind::CampaignResumed, &campaign).await;
    Ok(Json(campaign))
}

pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>> {
    let campaign = state.db.complete_campaign(id)?;
    state.events.emit(EventKind::CampaignCompleted, &campaign).await;
    Ok(Json(campaign))
}

/// Counts and rates for a launched campaign. Drafts have no results yet.
pub async fn stats(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<CampaignStats>> {
    db.get_campaign(id)?.ok_or(Error::NotFound("Campaign"))?;
    let result = db
        .get_campaign_result(id)?
        .ok_or(Error::NotFound("Campaign results"))?;
    Ok(Json(analytics::campaign_stats(&result)))
}
