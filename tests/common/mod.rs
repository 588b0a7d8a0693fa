#![allow(dead_code)]

use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use jsonwebtoken::{EncodingKey, Header};
use portal_gate::ServerConfig;
use portal_gate::cli::Environment;
use portal_gate::session::{SessionClaims, now_secs};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const IGNORED_MESSAGE: &str = "You have not been subscribed to a service yet.";

/// A request as the mock backend saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub body: Vec<u8>,
}

/// Stand-in for the portal REST backend, served on an ephemeral port.
#[derive(Clone)]
pub struct MockBackend {
    pub url: Url,
    requests: Arc<Mutex<Vec<Recorded>>>,
    user_status: Arc<AtomicU16>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock backend");
        let addr = listener.local_addr().expect("Failed to get local address");

        let mock = MockBackend {
            url: Url::parse(&format!("http://{}", addr)).unwrap(),
            requests: Arc::new(Mutex::new(Vec::new())),
            user_status: Arc::new(AtomicU16::new(200)),
        };

        let app = Router::new()
            .route("/user", get(user))
            .route("/signin", post(signin))
            .route("/signup", post(|| async { (StatusCode::CREATED, Json(json!({"message": "created"}))) }))
            .route("/reset-password", post(|| async { Json(json!({})) }))
            .route("/logout", post(|| async { Json(json!({})) }))
            .route(
                "/resource-instance/version",
                get(|| async { Json(json!({"version": "1.2.3"})) }),
            )
            .route(
                "/unsubscribed",
                get(|| async { (StatusCode::FORBIDDEN, Json(json!({"message": IGNORED_MESSAGE}))) }),
            )
            .route(
                "/quota",
                get(|| async { (StatusCode::BAD_REQUEST, Json(json!({"message": "Quota exceeded"}))) }),
            )
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .route(
                "/expired",
                get(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"message": "Token expired"}))) }),
            )
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Json(json!({}))
                }),
            )
            .fallback(echo)
            .layer(middleware::from_fn_with_state(mock.clone(), record))
            .with_state(mock.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        mock
    }

    pub fn set_user_status(&self, status: u16) {
        self.user_status.store(status, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn record(State(mock): State<MockBackend>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    mock.requests.lock().unwrap().push(Recorded {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        authorization: parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: bytes.to_vec(),
    });
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn user(State(mock): State<MockBackend>) -> StatusCode {
    StatusCode::from_u16(mock.user_status.load(Ordering::SeqCst)).unwrap()
}

async fn signin(Json(credentials): Json<Value>) -> Response {
    if credentials["password"] == "correct" {
        Json(json!({"jwtToken": token_expiring_in(3600)})).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "Invalid credentials"})),
        )
            .into_response()
    }
}

/// Echo the request back as JSON.
async fn echo(request: Request) -> Json<Value> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();
    Json(json!({
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "authorization": parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok()),
        "body": serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null),
    }))
}

/// A backend-style token; the signing key is irrelevant to the portal.
pub fn token_with_exp(exp: u64) -> String {
    let claims = SessionClaims {
        exp,
        sub: Some("user-1".to_string()),
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"backend-secret"),
    )
    .unwrap()
}

pub fn token_expiring_in(secs: u64) -> String {
    token_with_exp(now_secs() + secs)
}

pub fn test_config(backend_url: Url, environment: Environment) -> ServerConfig {
    ServerConfig {
        backend_url,
        environment,
        analytics_id: Some("G-TEST".to_string()),
        upstream_timeout: Duration::from_secs(2),
        signin_rate_limit: 100,
        trust_forwarded_for: false,
        csp_nonce: false,
    }
}

pub async fn body_json(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}
