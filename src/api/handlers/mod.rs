pub mod analytics;
pub mod auth;
pub mod campaigns;
pub mod customers;
pub mod demo;
pub mod segments;

use axum::{response::IntoResponse, Json};

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
