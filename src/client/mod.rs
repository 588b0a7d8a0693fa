//! Portal client: issues backend calls through the edge proxy and applies
//! the global session and error handling to every response.
//!
//! ```ignore
//! let session = SessionContext::builder(cookies, storage).build();
//! let client = ApiClient::builder(config, session).with_default_hooks().build()?;
//! let version = client.send(ApiCall::get("/resource-instance/version")).await?;
//! ```

mod call;
mod channel;
mod endpoints;
mod hooks;
mod notify;
mod queries;
mod session;

pub use call::{ApiCall, ApiResponse, Base, ClientError};
pub use channel::{
    BroadcastHub, ChannelError, ChannelMessage, SESSION_CHANNEL_NAME, SessionChannel,
    SessionMessage,
};
pub use endpoints::{
    LOGOUT_ENDPOINT, NON_PROTECTED_PREFIXES, SIGNIN_ENDPOINTS, is_cli_download, is_protected,
};
pub use hooks::{ErrorBannerHook, ProxyRewrite, RequestHook, ResponseHook, SessionExpiryHook};
pub use notify::{Banner, FALLBACK_MESSAGE, Notifications};
pub use queries::{QueryGuard, QueryRegistry};
pub use session::{SESSION_STORAGE_FLAGS, SessionContext, SessionContextBuilder};

use reqwest::header;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::backend::join_endpoint;
use crate::envelope::query_pairs;
use crate::session::TOKEN_COOKIE_NAME;
use call::error_message;

/// Server messages that never reach the banner.
pub const DEFAULT_IGNORED_MESSAGES: &[&str] = &["You have not been subscribed to a service yet."];

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "-client/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin of the portal edge server
    pub origin: Url,
    /// Base URL of the backend, for calls that are not proxied
    pub api_base: Url,
    /// How long a banner stays up
    pub banner_duration: Duration,
    pub ignored_messages: Vec<String>,
    /// Timeout for every call
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(origin: Url, api_base: Url) -> Self {
        Self {
            origin,
            api_base,
            banner_duration: Duration::from_secs(5),
            ignored_messages: DEFAULT_IGNORED_MESSAGES
                .iter()
                .map(|message| message.to_string())
                .collect(),
            timeout: Duration::from_secs(crate::cli::DEFAULT_UPSTREAM_TIMEOUT_SECS),
        }
    }
}

pub struct ApiClientBuilder {
    config: ClientConfig,
    session: Arc<SessionContext>,
    notifications: Notifications,
    request_hooks: Vec<Arc<dyn RequestHook>>,
    response_hooks: Vec<Arc<dyn ResponseHook>>,
}

impl ApiClientBuilder {
    pub fn request_hook(mut self, hook: impl RequestHook + 'static) -> Self {
        self.request_hooks.push(Arc::new(hook));
        self
    }

    pub fn response_hook(mut self, hook: impl ResponseHook + 'static) -> Self {
        self.response_hooks.push(Arc::new(hook));
        self
    }

    /// Proxy rewrite, then session expiry before the error banner.
    pub fn with_default_hooks(self) -> Self {
        let session = self.session.clone();
        let banner = ErrorBannerHook::new(
            self.notifications.clone(),
            self.config.ignored_messages.clone(),
        );
        self.request_hook(ProxyRewrite::new(session.clone()))
            .response_hook(SessionExpiryHook::new(session))
            .response_hook(banner)
    }

    pub fn build(self) -> Result<ApiClient, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(self.config.timeout)
            .build()?;
        Ok(ApiClient {
            http,
            config: self.config,
            session: self.session,
            notifications: self.notifications,
            request_hooks: self.request_hooks,
            response_hooks: self.response_hooks,
        })
    }
}

pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: Arc<SessionContext>,
    notifications: Notifications,
    request_hooks: Vec<Arc<dyn RequestHook>>,
    response_hooks: Vec<Arc<dyn ResponseHook>>,
}

impl ApiClient {
    pub fn builder(config: ClientConfig, session: Arc<SessionContext>) -> ApiClientBuilder {
        let notifications = Notifications::new(config.banner_duration);
        ApiClientBuilder {
            config,
            session,
            notifications,
            request_hooks: Vec::new(),
            response_hooks: Vec::new(),
        }
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    /// Run the request hooks, dispatch, then run the response hooks.
    ///
    /// Errors raised by a request hook return immediately. A call cancelled
    /// while in flight resolves with [`ClientError::Canceled`]; neither case
    /// reaches the response hooks.
    pub async fn send(&self, call: ApiCall) -> Result<ApiResponse, ClientError> {
        let mut call = call;
        for hook in &self.request_hooks {
            call = hook.on_request(call)?;
        }

        let mut guard = self.session.queries().track();
        let result = tokio::select! {
            biased;
            _ = guard.cancelled() => Err(ClientError::Canceled),
            result = self.dispatch(&call) => result,
        };
        drop(guard);

        match &result {
            Ok(response) => {
                for hook in &self.response_hooks {
                    hook.on_success(&call, response);
                }
            }
            Err(ClientError::Canceled | ClientError::Aborted { .. }) => {}
            Err(error) => {
                for hook in &self.response_hooks {
                    debug!(hook = hook.name(), endpoint = %call.endpoint(), "Response hook");
                    hook.on_error(&call, error);
                }
            }
        }
        result
    }

    pub async fn get(&self, url: &str) -> Result<ApiResponse, ClientError> {
        self.send(ApiCall::get(url)).await
    }

    pub async fn post(&self, url: &str, data: serde_json::Value) -> Result<ApiResponse, ClientError> {
        self.send(ApiCall::post(url).data(data)).await
    }

    pub async fn put(&self, url: &str, data: serde_json::Value) -> Result<ApiResponse, ClientError> {
        self.send(ApiCall::put(url).data(data)).await
    }

    pub async fn delete(&self, url: &str) -> Result<ApiResponse, ClientError> {
        self.send(ApiCall::delete(url)).await
    }

    /// Full logout: tell the backend, tear down this tab, then tell the
    /// other tabs. The local teardown happens whatever the backend says, and
    /// a failed backend call shows no banner.
    pub async fn logout(&self) {
        let call = ApiCall::post(LOGOUT_ENDPOINT).silent(true);
        if let Err(e) = self.send(call).await {
            debug!(error = %e, "Backend logout failed");
        }
        self.session.logout_local();
        self.session.broadcast_logout();
    }

    fn resolve_url(&self, call: &ApiCall) -> Result<Url, ClientError> {
        if call.url.starts_with("//") {
            let scheme = self.config.origin.scheme();
            return Ok(Url::parse(&format!("{}:{}", scheme, call.url))?);
        }
        if let Ok(url) = Url::parse(&call.url) {
            return Ok(url);
        }
        let base = match call.base {
            Base::Backend => &self.config.api_base,
            Base::SameOrigin => &self.config.origin,
        };
        Ok(join_endpoint(base, &call.url))
    }

    async fn dispatch(&self, call: &ApiCall) -> Result<ApiResponse, ClientError> {
        let url = self.resolve_url(call)?;
        let same_origin = url.origin() == self.config.origin.origin();
        let backend_origin = url.origin() == self.config.api_base.origin();
        let mut request = self.http.request(call.method.clone(), url);

        if let Some(params) = &call.params {
            request = request.query(&query_pairs(params));
        }
        if let Some(data) = &call.data {
            request = request.json(data);
        }
        // Credentials only go to the edge (as its cookie) or the backend.
        if let Some(token) = self.session.token() {
            if same_origin {
                request = request.header(header::COOKIE, format!("{}={}", TOKEN_COOKIE_NAME, token));
            } else if backend_origin {
                request = request.bearer_auth(token);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        if status.is_success() {
            Ok(ApiResponse { status, body })
        } else {
            Err(ClientError::Status {
                status,
                message: error_message(&body),
                body,
            })
        }
    }
}
