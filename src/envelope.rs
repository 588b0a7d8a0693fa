//! The request metadata envelope carried by `POST /api/action`.
//!
//! The client wraps a direct backend call into this envelope; the edge relay
//! unwraps it and replays the call against the backend.

use axum::http::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Same-origin path of the proxy endpoint.
pub const PROXY_PATH: &str = "/api/action";

/// Query parameter naming the original endpoint on proxied calls.
pub const ENDPOINT_QUERY_PARAM: &str = "endpoint";

/// Query parameters as the client supplied them.
pub type QueryParams = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEnvelope {
    /// Original backend path, e.g. `/resource-instance/version`
    pub endpoint: String,
    /// Original HTTP method, uppercase
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_params: Option<QueryParams>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("endpoint must be a relative backend path")]
    InvalidEndpoint,
    #[error("unsupported method: {0}")]
    InvalidMethod(String),
}

impl RequestEnvelope {
    pub fn new(
        endpoint: impl Into<String>,
        method: &Method,
        data: Option<Value>,
        query_params: Option<QueryParams>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: method.as_str().to_ascii_uppercase(),
            data,
            query_params: query_params.filter(|params| !params.is_empty()),
        }
    }

    /// Check that the envelope names a backend-relative path and a real method.
    /// Returns the parsed method.
    pub fn validate(&self) -> Result<Method, EnvelopeError> {
        let endpoint = self.endpoint.as_str();
        let relative = endpoint.starts_with('/')
            && !endpoint.starts_with("//")
            && !endpoint.contains('\\')
            && !endpoint.contains("://")
            && !endpoint.split(['/', '?']).any(|segment| segment == "..");
        if !relative {
            return Err(EnvelopeError::InvalidEndpoint);
        }

        let upper = self.method.to_ascii_uppercase();
        match upper.as_str() {
            "GET" | "POST" | "PUT" | "PATCH" | "DELETE" | "HEAD" | "OPTIONS" => {
                Method::from_bytes(upper.as_bytes())
                    .map_err(|_| EnvelopeError::InvalidMethod(self.method.clone()))
            }
            _ => Err(EnvelopeError::InvalidMethod(self.method.clone())),
        }
    }
}

/// Flatten query parameters into string pairs. Arrays repeat their key,
/// nulls are dropped, and non-string scalars use their JSON text.
pub fn query_pairs(params: &QueryParams) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len());
    for (key, value) in params {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    if let Some(text) = scalar_text(item) {
                        pairs.push((key.clone(), text));
                    }
                }
            }
            other => {
                if let Some(text) = scalar_text(other) {
                    pairs.push((key.clone(), text));
                }
            }
        }
    }
    pairs
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
