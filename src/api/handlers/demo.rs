use axum::{extract::State, http::StatusCode};

use crate::api::extract::Json;
use crate::api::AppState;
use crate::demo::{self, DemoSummary};
use crate::error::Result;

/// Seed demo data on an empty store. 201 when data was created, 200 when it
/// already existed.
pub async fn initialize(State(state): State<AppState>) -> Result<(StatusCode, Json<DemoSummary>)> {
    let summary = demo::initialize_demo_data(&state.db, &state.config.simulator)?;
    let status = if summary.initialized {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(summary)))
}
