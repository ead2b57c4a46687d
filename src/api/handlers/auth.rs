use axum::{extract::State, http::StatusCode, Extension};

use crate::api::extract::Json;
use crate::api::middleware::SessionToken;
use crate::api::AppState;
use crate::auth::{self, Principal};
use crate::db::Database;
use crate::error::Result;
use crate::models::{LoginInput, LoginResponse};

pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<Json<LoginResponse>> {
    auth::login(&state.db, &input, state.config.session_ttl).map(Json)
}

pub async fn logout(
    State(db): State<Database>,
    Extension(SessionToken(token)): Extension<SessionToken>,
) -> Result<StatusCode> {
    auth::logout(&db, &token)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(Extension(principal): Extension<Principal>) -> Json<Principal> {
    Json(principal)
}
