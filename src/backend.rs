//! HTTP access to the portal REST backend.
//!
//! The backend is an external collaborator reached only through its HTTP
//! contract. The edge uses it for the `/user` liveness check and for
//! relaying proxied calls.

use axum::http::{Method, StatusCode};
use std::time::Duration;
use url::Url;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Liveness endpoint used to confirm a token is still accepted.
pub const USER_ENDPOINT: &str = "/user";

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid backend endpoint: {0}")]
    Url(#[from] url::ParseError),
    #[error("backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend rejected the session with status {0}")]
    Rejected(StatusCode),
}

/// Append `path` to the path of `base`, keeping any prefix the base carries.
/// A query string inside `path` is preserved.
pub fn join_endpoint(base: &Url, path: &str) -> Url {
    let (path, query) = match path.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path, None),
    };

    let mut url = base.clone();
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    url.set_path(&joined);
    url.set_query(query.filter(|q| !q.is_empty()));
    url.set_fragment(None);
    url
}

/// Client for the backend, built once at startup.
#[derive(Clone)]
pub struct Backend {
    http: reqwest::Client,
    base: Url,
}

impl Backend {
    /// Create a backend client. Every call is bounded by `timeout`.
    pub fn new(base: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn endpoint(&self, path: &str) -> Url {
        join_endpoint(&self.base, path)
    }

    /// Start a request against a backend endpoint.
    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http.request(method, self.endpoint(path))
    }

    /// Ask the backend whether `token` still identifies a live session.
    /// Only a 200 counts as success.
    pub async fn verify_user(&self, token: &str) -> Result<(), UpstreamError> {
        let response = self
            .request(Method::GET, USER_ENDPOINT)
            .bearer_auth(token)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(UpstreamError::Rejected(status)),
        }
    }
}
