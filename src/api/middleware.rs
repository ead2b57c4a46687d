//! Session authentication for the protected API routes.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::auth;
use crate::db::Database;
use crate::error::Error;

/// The raw bearer token of the current request, kept so logout can revoke it.
#[derive(Clone, Debug)]
pub struct SessionToken(pub String);

/// Resolve the bearer token to a [`auth::Principal`] and attach it to the
/// request. Requests without a live session get 401.
pub async fn require_session(
    State(db): State<Database>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Error> {
    let Some(token) = bearer_token(request.headers()) else {
        tracing::warn!("Missing or malformed Authorization header");
        return Err(Error::Unauthorized);
    };

    let principal = auth::authenticate(&db, &token).inspect_err(|e| {
        if matches!(e, Error::Unauthorized) {
            tracing::warn!("Rejected unknown or expired session token");
        }
    })?;

    request.extensions_mut().insert(principal);
    request.extensions_mut().insert(SessionToken(token));
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        assert_eq!(bearer_token(&headers("Bearer abc123")), Some("abc123".to_string()));
    }

    #[test]
    fn rejects_other_schemes() {
        assert_eq!(bearer_token(&headers("Basic dXNlcjpwYXNz")), None);
        assert_eq!(bearer_token(&headers("Bearer   ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }
}
