//! Operator authentication: Argon2id password hashes and bearer session
//! tokens that expire.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{AuthSession, LoginInput, LoginResponse, Role, User};

const TOKEN_BYTES: usize = 32;

/// The authenticated operator behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

/// Hash a password in PHC format (`$argon2id$...`).
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| Error::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| Error::PasswordHash(e.to_string()))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(Error::PasswordHash(e.to_string())),
    }
}

/// A fresh random token, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Check credentials and issue a session token valid for `ttl`.
///
/// Unknown usernames and wrong passwords fail the same way.
pub fn login(db: &Database, input: &LoginInput, ttl: Duration) -> Result<LoginResponse> {
    let Some((user, hash)) = db.get_user_credentials(input.username.trim())? else {
        tracing::warn!(username = %input.username, "Login for unknown user");
        return Err(Error::Unauthorized);
    };
    if !verify_password(&input.password, &hash)? {
        tracing::warn!(username = %user.username, "Login with wrong password");
        return Err(Error::Unauthorized);
    }

    let now = Utc::now();
    let expires_at = now
        .checked_add_signed(ttl)
        .ok_or_else(|| Error::Internal(format!("session lifetime {} out of range", ttl)))?;
    let session = AuthSession {
        token: generate_token(),
        user_id: user.id,
        created_at: now,
        expires_at,
    };
    db.create_auth_session(&session)?;
    tracing::info!(username = %user.username, "User logged in");

    Ok(LoginResponse {
        token: session.token,
        expires_at: session.expires_at,
        user,
    })
}

/// Resolve a bearer token to its principal. Expired tokens are deleted and
/// rejected.
pub fn authenticate(db: &Database, token: &str) -> Result<Principal> {
    let session = db.get_auth_session(token)?.ok_or(Error::Unauthorized)?;
    if session.is_expired(Utc::now()) {
        db.delete_auth_session(token)?;
        return Err(Error::Unauthorized);
    }
    let user = db.get_user(session.user_id)?.ok_or(Error::Unauthorized)?;
    Ok(Principal::from(&user))
}

pub fn logout(db: &Database, token: &str) -> Result<()> {
    db.delete_auth_session(token)?;
    Ok(())
}
