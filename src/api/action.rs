//! Same-origin relay for proxied backend calls.
//!
//! - POST `/action?endpoint=<path>` - replay the enveloped call against the
//!   backend with the session token from the cookie as bearer credential

use axum::{
    Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::ApiError;
use crate::auth::get_cookie;
use crate::backend::Backend;
use crate::envelope::{ENDPOINT_QUERY_PARAM, RequestEnvelope, query_pairs};
use crate::session::TOKEN_COOKIE_NAME;

#[derive(Clone)]
pub struct ActionState {
    pub backend: Arc<Backend>,
}

pub fn router(state: ActionState) -> Router {
    Router::new().route("/", post(relay)).with_state(state)
}

#[derive(Deserialize)]
struct RelayQuery {
    endpoint: Option<String>,
}

async fn relay(
    State(state): State<ActionState>,
    Query(query): Query<RelayQuery>,
    headers: HeaderMap,
    payload: Result<Json<RequestEnvelope>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(envelope) = payload?;
    let method = envelope
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    if let Some(routed) = query.endpoint.as_deref() {
        if routed != envelope.endpoint {
            debug!(
                routed = %routed,
                endpoint = %envelope.endpoint,
                "{} query parameter differs from envelope",
                ENDPOINT_QUERY_PARAM
            );
        }
    }

    let request_id = Uuid::new_v4().to_string();
    let mut upstream = state
        .backend
        .request(method.clone(), &envelope.endpoint)
        .header("X-Request-Id", &request_id);

    if let Some(token) = get_cookie(&headers, TOKEN_COOKIE_NAME) {
        upstream = upstream.bearer_auth(token);
    }
    if let Some(params) = &envelope.query_params {
        upstream = upstream.query(&query_pairs(params));
    }
    if let Some(data) = &envelope.data {
        upstream = upstream.json(data);
    }

    let response = upstream
        .send()
        .await
        .map_err(|e| ApiError::upstream("Relay to backend failed", e))?;

    info!(
        request_id = %request_id,
        method = %method,
        endpoint = %envelope.endpoint,
        status = response.status().as_u16(),
        "Relayed"
    );

    relay_response(response).await
}

/// Copy status, content type and body of a backend response.
pub(super) async fn relay_response(response: reqwest::Response) -> Result<Response, ApiError> {
    let (status, content_type, body) = read_upstream(response).await?;
    Ok(build_response(status, content_type, body))
}

pub(super) async fn read_upstream(
    response: reqwest::Response,
) -> Result<(StatusCode, Option<HeaderValue>, Vec<u8>), ApiError> {
    let status = response.status();
    let content_type = response.headers().get(header::CONTENT_TYPE).cloned();
    let body = response
        .bytes()
        .await
        .map_err(|e| ApiError::upstream("Failed to read backend response", e))?;
    Ok((status, content_type, body.to_vec()))
}

pub(super) fn build_response(
    status: StatusCode,
    content_type: Option<HeaderValue>,
    body: Vec<u8>,
) -> Response {
    let mut response = (status, body).into_response();
    let headers = response.headers_mut();
    match content_type {
        Some(value) => {
            headers.insert(header::CONTENT_TYPE, value);
        }
        None => {
            headers.remove(header::CONTENT_TYPE);
        }
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
