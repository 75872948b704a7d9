//! Session token issuance and verification.
//!
//! The identity surface the pipeline consumes: a bearer credential either
//! resolves to a `UserIdentity` or the request runs as guest. Verification
//! is a plain function composed at the boundary, not a call wrapper.

use crate::error::AuthError;
use crate::store::{Store, UserIdentity};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;

pub const SESSION_TTL_DAYS: i64 = 30;
const TOKEN_BYTES: usize = 32;

/// Generate an opaque URL-safe bearer token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Create a session for a user, returning the bearer token.
pub fn issue_session(store: &Store, user_id: &str) -> Result<String, AuthError> {
    let token = generate_token();
    let expires_at = (Utc::now() + Duration::days(SESSION_TTL_DAYS)).to_rfc3339();
    store.insert_session(&token, user_id, &expires_at)?;
    Ok(token)
}

/// Resolve a bearer credential to a user identity. Callers map any error
/// to guest mode; nothing here aborts a pipeline run.
pub fn verify(store: &Store, credential: &str) -> Result<UserIdentity, AuthError> {
    let session = store
        .get_session(credential)?
        .ok_or(AuthError::InvalidToken)?;

    let expires_at = DateTime::parse_from_rfc3339(&session.expires_at)
        .map_err(|_| AuthError::InvalidToken)?;
    if expires_at < Utc::now() {
        return Err(AuthError::Expired);
    }

    store
        .get_user(&session.user_id)?
        .ok_or(AuthError::InvalidToken)
}
