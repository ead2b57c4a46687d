use axum::{extract::State, http::StatusCode};
use uuid::Uuid;

use crate::api::extract::{Json, Path};
use crate::api::AppState;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::events::EventKind;
use crate::models::*;

pub async fn list(State(db): State<Database>) -> Result<Json<Vec<Segment>>> {
    db.list_segments().map(Json)
}

pub async fn get(State(db): State<Database>, Path(id): Path<Uuid>) -> Result<Json<Segment>> {
    db.get_segment(id)?
        .map(Json)
        .ok_or(Error::NotFound("Segment"))
}

pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateSegmentInput>,
) -> Result<(StatusCode, Json<Segment>)> {
    let segment = state.db.create_segment(input)?;
    state.events.emit(EventKind::SegmentRefreshed, &segment).await;
    Ok((StatusCode::CREATED, Json(segment)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSegmentInput>,
) -> Result<Json<Segment>> {
    let rule_changed = input.criteria.is_some();
    let segment = state
        .db
        .update_segment(id, input)?
        .ok_or(Error::NotFound("Segment"))?;
    if rule_changed {
        state.events.emit(EventKind::SegmentRefreshed, &segment).await;
    }
    Ok(Json(segment))
}

pub async fn delete(State(db): State<Database>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    if db.delete_segment(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound("Segment"))
    }
}

pub async fn members(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
) -> Result<Json<SegmentMembers>> {
    db.get_segment_members(id).map(Json)
}

pub async fn refresh(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Segment>> {
    let segment = state.db.refresh_segment(id)?;
    state.events.emit(EventKind::SegmentRefreshed, &segment).await;
    Ok(Json(segment))
}
