use axum::{extract::State, http::StatusCode};
use uuid::Uuid;

use crate::api::extract::{Json, Path, Query};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::*;

pub async fn list(
    State(db): State<Database>,
    Query(query): Query<ListCustomersQuery>,
) -> Result<Json<CustomerPage>> {
    db.list_customers(&query).map(Json)
}

pub async fn get(State(db): State<Database>, Path(id): Path<Uuid>) -> Result<Json<Customer>> {
    db.get_customer(id)?
        .map(Json)
        .ok_or(Error::NotFound("Customer"))
}

pub async fn create(
    State(db): State<Database>,
    Json(input): Json<CreateCustomerInput>,
) -> Result<(StatusCode, Json<Customer>)> {
    db.create_customer(input)
        .map(|c| (StatusCode::CREATED, Json(c)))
}

pub async fn update(
    State(db): State<Database>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateCustomerInput>,
) -> Result<Json<Customer>> {
    db.update_customer(id, input)?
        .map(Json)
        .ok_or(Error::NotFound("Customer"))
}

pub async fn delete(State(db): State<Database>, Path(id): Path<Uuid>) -> Result<StatusCode> {
    if db.delete_customer(id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound("Customer"))
    }
}
