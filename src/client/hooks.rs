//! Request and response hooks of the portal client.
//!
//! Request hooks run in registration order and may rewrite or refuse a call.
//! Response hooks observe the outcome; they never change what the caller
//! receives.

use reqwest::{Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::call::{ApiCall, ApiResponse, Base, ClientError};
use super::endpoints::{
    SAME_ORIGIN_PREFIX, is_absolute, is_cli_download, is_protected, is_signin_endpoint, path_of,
};
use super::notify::{FALLBACK_MESSAGE, Notifications};
use super::session::SessionContext;
use crate::envelope::{ENDPOINT_QUERY_PARAM, PROXY_PATH, QueryParams, RequestEnvelope};

pub trait RequestHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_request(&self, call: ApiCall) -> Result<ApiCall, ClientError>;
}

pub trait ResponseHook: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_success(&self, _call: &ApiCall, _response: &ApiResponse) {}

    fn on_error(&self, call: &ApiCall, error: &ClientError);
}

/// Wraps direct backend calls into a `POST /api/action` envelope so they
/// leave the browser same-origin, and refuses protected calls without a
/// session token.
pub struct ProxyRewrite {
    session: Arc<SessionContext>,
}

impl ProxyRewrite {
    pub fn new(session: Arc<SessionContext>) -> Self {
        Self { session }
    }
}

impl RequestHook for ProxyRewrite {
    fn name(&self) -> &'static str {
        "proxy-rewrite"
    }

    fn on_request(&self, mut call: ApiCall) -> Result<ApiCall, ClientError> {
        if call.original_url.is_some() || is_absolute(&call.url) {
            return Ok(call);
        }

        let path = path_of(&call.url);
        if path.starts_with(SAME_ORIGIN_PREFIX) {
            call.base = Base::SameOrigin;
            return Ok(call);
        }
        if is_cli_download(path) {
            return Ok(call);
        }

        if is_protected(path) && self.session.token().is_none() {
            info!(endpoint = %path, "Aborting protected call without session");
            return Err(ClientError::Aborted {
                endpoint: path.to_string(),
            });
        }

        let envelope = RequestEnvelope::new(
            call.url.clone(),
            &call.method,
            call.data.take(),
            call.params.take(),
        );

        let mut params = QueryParams::new();
        params.insert(
            ENDPOINT_QUERY_PARAM.to_string(),
            Value::String(call.url.clone()),
        );

        debug!(endpoint = %call.url, method = %call.method, "Proxying call");
        call.data = Some(serde_json::to_value(&envelope)?);
        call.original_url = Some(std::mem::replace(&mut call.url, PROXY_PATH.to_string()));
        call.method = Method::POST;
        call.params = Some(params);
        call.base = Base::SameOrigin;
        Ok(call)
    }
}

/// Logs the tab out when the backend says the session is gone.
pub struct SessionExpiryHook {
    session: Arc<SessionContext>,
}

impl SessionExpiryHook {
    pub fn new(session: Arc<SessionContext>) -> Self {
        Self { session }
    }
}

impl ResponseHook for SessionExpiryHook {
    fn name(&self) -> &'static str {
        "session-expiry"
    }

    fn on_error(&self, call: &ApiCall, error: &ClientError) {
        if error.status() != Some(StatusCode::UNAUTHORIZED) {
            return;
        }
        if is_signin_endpoint(call.endpoint()) {
            return;
        }
        info!(endpoint = %call.endpoint(), "Session rejected by backend");
        self.session.logout_local();
    }
}

/// Shows failed calls in the global banner.
pub struct ErrorBannerHook {
    notifications: Notifications,
    ignored_messages: Vec<String>,
}

impl ErrorBannerHook {
    pub fn new(notifications: Notifications, ignored_messages: Vec<String>) -> Self {
        Self {
            notifications,
            ignored_messages,
        }
    }

    fn is_ignored(&self, message: &str) -> bool {
        self.ignored_messages.iter().any(|ignored| ignored == message)
    }
}

impl ResponseHook for ErrorBannerHook {
    fn name(&self) -> &'static str {
        "error-banner"
    }

    fn on_error(&self, call: &ApiCall, error: &ClientError) {
        if call.silent {
            return;
        }
        match error {
            ClientError::Status { status, .. } if *status == StatusCode::UNAUTHORIZED => {}
            ClientError::Status { body, .. } if body.is_empty() => {
                self.notifications.show(FALLBACK_MESSAGE);
            }
            ClientError::Status { .. } if call.ignore_global_error => {}
            ClientError::Status { message, .. } => match message.as_deref() {
                Some(message) if self.is_ignored(message) => {
                    debug!(message = %message, "Ignored error message");
                }
                Some(message) => self.notifications.show(message),
                None => self.notifications.show(FALLBACK_MESSAGE),
            },
            ClientError::Transport(_) => self.notifications.show(FALLBACK_MESSAGE),
            _ => {}
        }
    }
}
