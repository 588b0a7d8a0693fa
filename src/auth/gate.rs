//! Edge auth gate: decides for every page request whether to pass it
//! through, send the visitor to sign-in, or forward a signed-in visitor of
//! the sign-in page to their destination.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, info};

use super::cookie::{expired_session_cookie, get_cookie};
use super::paths::{SIGNIN_PATH, is_matcher_excluded, is_public, is_signin, resolve_destination};
use crate::backend::Backend;
use crate::cli::Environment;
use crate::session::{TOKEN_COOKIE_NAME, is_session_valid, now_secs};

/// Cache-Control value attached to every gated response.
pub const NO_STORE: &str = "no-store, max-age=0";

/// State shared by every invocation of the gate.
#[derive(Clone)]
pub struct GateState {
    pub environment: Environment,
    pub backend: Arc<Backend>,
}

/// Terminal outcome of the gate for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Path is on the matcher exclusion list; the gate does not apply.
    Excluded,
    /// Public page outside prod; token never inspected.
    PublicBypass,
    /// No usable session. `stale_cookie` is set when a token cookie was
    /// presented but turned out expired or rejected.
    Unauthenticated { stale_cookie: bool },
    /// Signed-in visitor of the sign-in page.
    RedirectFromSignin(String),
    /// Signed-in visitor of any other page.
    Passthrough,
}

impl GateState {
    /// Classify a request. Never fails: backend errors count as an
    /// unauthenticated session.
    pub async fn evaluate(&self, path: &str, query: Option<&str>, headers: &HeaderMap) -> GateOutcome {
        if is_matcher_excluded(path) {
            return GateOutcome::Excluded;
        }
        if is_public(path, self.environment) {
            return GateOutcome::PublicBypass;
        }

        let Some(token) = get_cookie(headers, TOKEN_COOKIE_NAME) else {
            debug!(path = %path, "No session cookie");
            return GateOutcome::Unauthenticated { stale_cookie: false };
        };

        if !is_session_valid(token, now_secs()) {
            debug!(path = %path, "Session token expired or unreadable");
            return GateOutcome::Unauthenticated { stale_cookie: true };
        }

        if let Err(e) = self.backend.verify_user(token).await {
            info!(path = %path, error = %e, "Session check against backend failed");
            return GateOutcome::Unauthenticated { stale_cookie: true };
        }

        if is_signin(path) {
            return GateOutcome::RedirectFromSignin(resolve_destination(query));
        }

        GateOutcome::Passthrough
    }
}

/// Axum middleware wrapping the page routes.
pub async fn auth_gate(State(gate): State<GateState>, request: Request, next: Next) -> Response {
    let path = request.uri().path().to_owned();
    let outcome = gate
        .evaluate(&path, request.uri().query(), request.headers())
        .await;

    match outcome {
        GateOutcome::Excluded | GateOutcome::PublicBypass => next.run(request).await,
        GateOutcome::Unauthenticated { .. } if is_signin(&path) => {
            without_cache(next.run(request).await)
        }
        GateOutcome::Unauthenticated { stale_cookie } => {
            let mut response = without_cache(Redirect::temporary(SIGNIN_PATH).into_response());
            if stale_cookie {
                if let Ok(value) = HeaderValue::from_str(&expired_session_cookie()) {
                    response.headers_mut().append(header::SET_COOKIE, value);
                }
            }
            response
        }
        GateOutcome::RedirectFromSignin(destination) => {
            without_cache(Redirect::temporary(&destination).into_response())
        }
        GateOutcome::Passthrough => without_cache(next.run(request).await),
    }
}

fn without_cache(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static(NO_STORE));
    response
}
