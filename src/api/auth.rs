//! Public authentication relays.
//!
//! - POST `/signin` - relay credentials to the backend; on success store the
//!   returned JWT in the `token` cookie
//! - POST `/signup` - relay a registration request
//! - POST `/reset-password` - relay a password reset request

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderValue, Method, header},
    middleware,
    response::Response,
    routing::post,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::action::{build_response, read_upstream};
use super::error::ApiError;
use crate::auth::session_cookie;
use crate::backend::Backend;
use crate::rate_limit::{RateLimitConfig, rate_limit_signin};
use crate::session::{now_secs, remaining_lifetime};

#[derive(Clone)]
pub struct AuthRelayState {
    pub backend: Arc<Backend>,
}

pub fn signin_router(state: AuthRelayState, limits: Arc<RateLimitConfig>) -> Router {
    Router::new()
        .route("/", post(signin))
        .route_layer(middleware::from_fn_with_state(limits, rate_limit_signin))
        .with_state(state)
}

pub fn signup_router(state: AuthRelayState) -> Router {
    Router::new().route("/", post(signup)).with_state(state)
}

pub fn reset_password_router(state: AuthRelayState) -> Router {
    Router::new().route("/", post(reset_password)).with_state(state)
}

async fn forward(backend: &Backend, path: &str, body: &Value) -> Result<reqwest::Response, ApiError> {
    backend
        .request(Method::POST, path)
        .json(body)
        .send()
        .await
        .map_err(|e| ApiError::upstream("Public relay to backend failed", e))
}

async fn signin(
    State(state): State<AuthRelayState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(credentials) = payload?;
    let response = forward(&state.backend, "/signin", &credentials).await?;
    let (status, content_type, body) = read_upstream(response).await?;

    let token = status
        .is_success()
        .then(|| serde_json::from_slice::<Value>(&body).ok())
        .flatten()
        .and_then(|json| json.get("jwtToken").and_then(Value::as_str).map(str::to_owned));

    let mut response = build_response(status, content_type, body);

    match token {
        Some(token) => {
            let max_age = remaining_lifetime(&token, now_secs());
            match HeaderValue::from_str(&session_cookie(&token, max_age)) {
                Ok(value) => {
                    response.headers_mut().append(header::SET_COOKIE, value);
                    info!("Signed in");
                }
                Err(e) => warn!(error = %e, "Backend returned a token unusable as cookie"),
            }
        }
        None if status.is_success() => warn!("Sign-in succeeded without a jwtToken"),
        None => info!(status = status.as_u16(), "Sign-in rejected"),
    }

    Ok(response)
}

async fn signup(
    State(state): State<AuthRelayState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    let response = forward(&state.backend, "/signup", &body).await?;
    let (status, content_type, body) = read_upstream(response).await?;
    Ok(build_response(status, content_type, body))
}

async fn reset_password(
    State(state): State<AuthRelayState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = payload?;
    let response = forward(&state.backend, "/reset-password", &body).await?;
    let (status, content_type, body) = read_upstream(response).await?;
    Ok(build_response(status, content_type, body))
}
