//! Call description, responses, and errors of the portal client.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::endpoints::path_of;
use crate::envelope::QueryParams;

/// Which origin a relative call url resolves against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Base {
    /// The backend API base URL.
    #[default]
    Backend,
    /// The portal's own origin (the edge server).
    SameOrigin,
}

#[derive(Debug, Clone)]
pub struct ApiCall {
    pub url: String,
    pub method: Method,
    pub data: Option<Value>,
    pub params: Option<QueryParams>,
    pub base: Base,
    /// Skip the global error banner for this call.
    pub ignore_global_error: bool,
    /// Never show a banner for this call, not even the fallback.
    pub silent: bool,
    /// Set when the call was wrapped into a proxy envelope: the url the
    /// caller originally asked for.
    pub original_url: Option<String>,
}

impl ApiCall {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            data: None,
            params: None,
            base: Base::default(),
            ignore_global_error: false,
            silent: false,
            original_url: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params
            .get_or_insert_with(QueryParams::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn base(mut self, base: Base) -> Self {
        self.base = base;
        self
    }

    pub fn ignore_global_error(mut self, ignore: bool) -> Self {
        self.ignore_global_error = ignore;
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Backend path the caller meant, before any proxy rewrite.
    pub fn endpoint(&self) -> &str {
        path_of(self.original_url.as_deref().unwrap_or(&self.url))
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A protected endpoint was called without a session token. Nothing
    /// was sent.
    #[error("call to {endpoint} aborted: no session token")]
    Aborted { endpoint: String },
    /// The call was in flight when all queries were cancelled.
    #[error("call canceled")]
    Canceled,
    #[error("request failed with status {status}")]
    Status {
        status: StatusCode,
        /// `message` field of a JSON error body
        message: Option<String>,
        body: Vec<u8>,
    },
    #[error("no response: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// JSON encoding or decoding failed.
    #[error("json: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// `message` field of a JSON error body, if any.
pub(crate) fn error_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<Value>(body)
        .ok()?
        .get("message")?
        .as_str()
        .map(str::to_string)
}
