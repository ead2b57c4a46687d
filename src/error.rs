//! Error types shared by the store, the domain services and the HTTP layer.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Result type for crate operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Malformed rule, missing required field, or an illegal state change.
    #[error("{0}")]
    Validation(String),

    /// No session, or the session has expired.
    #[error("authentication required")]
    Unauthorized,

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Database(_) | Self::Json(_) | Self::PasswordHash(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for Error {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for Error {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for Error {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

/// Client errors are returned as-is. Internal failures are logged in full and
/// the client only sees a generic message.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            tracing::error!("Internal error: {}", self);
            "Internal server error".to_string()
        } else {
            tracing::warn!("Request failed ({}): {}", status.as_u16(), self);
            self.to_string()
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_client_errors_to_4xx() {
        assert_eq!(Error::NotFound("Segment").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::validation("bad").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn not_found_message_names_the_entity() {
        assert_eq!(Error::NotFound("Campaign").to_string(), "Campaign not found");
    }

    #[test]
    fn storage_errors_are_server_errors() {
        let err = Error::from(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
