mod common;

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode, header},
    response::Response,
};
use common::{MockBackend, body_json, test_config, token_expiring_in};
use portal_gate::cli::Environment;
use portal_gate::create_app;
use serde_json::{Value, json};
use std::net::SocketAddr;
use tower::ServiceExt;

async fn app(mock: &MockBackend) -> Router {
    create_app(&test_config(mock.url.clone(), Environment::Dev)).unwrap()
}

async fn post_json(app: Router, uri: &str, body: Value, token: Option<&str>) -> Response {
    let mut request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::COOKIE, format!("token={}", token));
    }
    let mut request = request.body(Body::from(body.to_string())).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 50000))));
    app.oneshot(request).await.unwrap()
}

#[tokio::test]
async fn test_action_relays_public_call() {
    let mock = MockBackend::start().await;
    let response = post_json(
        app(&mock).await,
        "/api/action?endpoint=/resource-instance/version",
        json!({"endpoint": "/resource-instance/version", "method": "GET"}),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
    assert_eq!(body_json(response).await, json!({"version": "1.2.3"}));

    let seen = mock.requests_to("/resource-instance/version");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].method, "GET");
    assert_eq!(seen[0].authorization, None);
}

#[tokio::test]
async fn test_action_forwards_token_query_and_body() {
    let mock = MockBackend::start().await;
    let token = token_expiring_in(3600);
    let response = post_json(
        app(&mock).await,
        "/api/action?endpoint=/subscription",
        json!({
            "endpoint": "/subscription",
            "method": "PUT",
            "data": {"planId": "p-1"},
            "queryParams": {"serviceId": "s-1", "ids": ["a", "b"]}
        }),
        Some(&token),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let echoed = body_json(response).await;
    assert_eq!(echoed["method"], "PUT");
    assert_eq!(echoed["path"], "/subscription");
    assert_eq!(echoed["query"], "ids=a&ids=b&serviceId=s-1");
    assert_eq!(echoed["authorization"], format!("Bearer {}", token));
    assert_eq!(echoed["body"], json!({"planId": "p-1"}));
}

#[tokio::test]
async fn test_action_keeps_backend_error_status_and_body() {
    let mock = MockBackend::start().await;
    let response = post_json(
        app(&mock).await,
        "/api/action?endpoint=/quota",
        json!({"endpoint": "/quota", "method": "GET"}),
        Some(&token_expiring_in(60)),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["message"], "Quota exceeded");
}

#[tokio::test]
async fn test_action_rejects_foreign_endpoint() {
    let mock = MockBackend::start().await;
    for endpoint in ["https://evil.example.com/x", "//evil.example.com", "/a/../../b"] {
        let response = post_json(
            app(&mock).await,
            "/api/action",
            json!({"endpoint": endpoint, "method": "GET"}),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{endpoint}");
        assert!(body_json(response).await["message"].is_string());
    }
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_action_rejects_unknown_method() {
    let mock = MockBackend::start().await;
    let response = post_json(
        app(&mock).await,
        "/api/action",
        json!({"endpoint": "/user", "method": "BREW"}),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_action_incomplete_envelope_is_bad_request() {
    let mock = MockBackend::start().await;
    for body in [json!({"endpoint": "/x"}), json!({"method": "GET"}), json!([1, 2])] {
        let response = post_json(app(&mock).await, "/api/action", body.clone(), None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{body}");
        assert!(body_json(response).await["message"].is_string(), "{body}");
    }
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_signup_without_json_is_bad_request() {
    let mock = MockBackend::start().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/signup")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("hello"))
        .unwrap();
    let response = app(&mock).await.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_json(response).await["message"].is_string());
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_action_unreachable_backend_is_bad_gateway() {
    let config = test_config(url::Url::parse("http://127.0.0.1:9").unwrap(), Environment::Dev);
    let app = create_app(&config).unwrap();
    let response = post_json(
        app,
        "/api/action",
        json!({"endpoint": "/user", "method": "GET"}),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["message"], "Upstream request failed");
}

#[tokio::test]
async fn test_signin_sets_session_cookie() {
    let mock = MockBackend::start().await;
    let response = post_json(
        app(&mock).await,
        "/api/signin",
        json!({"email": "a@example.com", "password": "correct"}),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let json = body_json(response).await;
    let token = json["jwtToken"].as_str().unwrap();

    assert!(set_cookie.starts_with(&format!("token={};", token)));
    assert!(set_cookie.contains("SameSite=Lax"));
    assert!(set_cookie.contains("Secure"));
    assert!(set_cookie.contains("Max-Age="));
}

#[tokio::test]
async fn test_failed_signin_sets_no_cookie() {
    let mock = MockBackend::start().await;
    let response = post_json(
        app(&mock).await,
        "/api/signin",
        json!({"email": "a@example.com", "password": "wrong"}),
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(body_json(response).await["message"], "Invalid credentials");
}

#[tokio::test]
async fn test_signin_is_rate_limited() {
    let mock = MockBackend::start().await;
    let mut config = test_config(mock.url.clone(), Environment::Dev);
    config.signin_rate_limit = 2;
    let app = create_app(&config).unwrap();

    let credentials = json!({"email": "a@example.com", "password": "wrong"});
    for _ in 0..2 {
        let response = post_json(app.clone(), "/api/signin", credentials.clone(), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
    let response = post_json(app, "/api/signin", credentials, None).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(mock.requests_to("/signin").len(), 2);
}

#[tokio::test]
async fn test_signup_and_reset_password_relays() {
    let mock = MockBackend::start().await;

    let response = post_json(app(&mock).await, "/api/signup", json!({"email": "b@example.com"}), None).await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = post_json(
        app(&mock).await,
        "/api/reset-password",
        json!({"email": "b@example.com"}),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let signup = mock.requests_to("/signup");
    assert_eq!(signup.len(), 1);
    let body: Value = serde_json::from_slice(&signup[0].body).unwrap();
    assert_eq!(body["email"], "b@example.com");
}

#[tokio::test]
async fn test_config_endpoint() {
    let mock = MockBackend::start().await;
    let response = app(&mock)
        .await
        .oneshot(Request::builder().uri("/api/config").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["environment"], "DEV");
    assert_eq!(json["analyticsId"], "G-TEST");
    assert!(json["version"].is_string());
}
