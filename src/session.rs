//! Session token inspection shared by the edge gate and the portal client.
//!
//! Tokens are minted by the backend and neither side holds the signing key,
//! so only the `exp` claim is read here. Whether the backend still accepts a
//! token is answered by the `/user` liveness check, not by this module.

use jsonwebtoken::dangerous::insecure_decode;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Cookie holding the bearer JWT.
pub const TOKEN_COOKIE_NAME: &str = "token";

/// Claims the portal cares about. Everything else in the token is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Subject, when the backend includes one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to decode session token: {0}")]
    Decode(#[from] jsonwebtoken::errors::Error),
}

/// Decode the claims of a session token without verifying its signature.
pub fn read_claims(token: &str) -> Result<SessionClaims, SessionError> {
    Ok(insecure_decode::<SessionClaims>(token)?.claims)
}

/// A token is usable while its `exp` lies strictly after `now`.
/// Undecodable tokens are never valid.
pub fn is_session_valid(token: &str, now: u64) -> bool {
    match read_claims(token) {
        Ok(claims) => claims.exp > now,
        Err(_) => false,
    }
}

/// Seconds remaining before the token expires, if it is still valid.
pub fn remaining_lifetime(token: &str, now: u64) -> Option<u64> {
    let claims = read_claims(token).ok()?;
    claims.exp.checked_sub(now).filter(|secs| *secs > 0)
}

/// Current Unix time in seconds.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
