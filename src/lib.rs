pub mod api;
pub mod auth;
pub mod backend;
pub mod cli;
pub mod client;
pub mod consent;
pub mod cookie_jar;
pub mod envelope;
pub mod pages;
pub mod rate_limit;
pub mod session;
pub mod storage;

use api::{ApiState, create_api_router};
use auth::{GateState, auth_gate};
use axum::{Router, middleware};
use backend::Backend;
use cli::Environment;
use pages::PagesState;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

pub struct ServerConfig {
    /// Base URL of the portal REST backend
    pub backend_url: Url,
    /// Deployment mode
    pub environment: Environment,
    /// Analytics tag identifier, if analytics is configured
    pub analytics_id: Option<String>,
    /// Timeout for every call the edge makes to the backend
    pub upstream_timeout: Duration,
    /// Sign-in attempts allowed per client IP per minute
    pub signin_rate_limit: u32,
    /// Take the client IP from X-Forwarded-For
    pub trust_forwarded_for: bool,
    /// Whether to add a random nonce to CSP headers for each page shell
    pub csp_nonce: bool,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, reqwest::Error> {
    let backend = Arc::new(Backend::new(
        config.backend_url.clone(),
        config.upstream_timeout,
    )?);

    let rate_limits = Arc::new(RateLimitConfig::new(
        config.signin_rate_limit,
        config.trust_forwarded_for,
    ));
    rate_limit::spawn_limiter_pruning(&rate_limits.signin);

    let api_router = create_api_router(ApiState {
        backend: backend.clone(),
        environment: config.environment,
        analytics_id: config.analytics_id.clone(),
        rate_limits,
    });

    let gate = GateState {
        environment: config.environment,
        backend,
    };

    // Every page goes through the gate; API routes carry their own checks.
    let page_routes = pages::router(PagesState {
        csp_nonce: config.csp_nonce,
    })
    .layer(middleware::from_fn_with_state(gate, auth_gate));

    Ok(Router::new().nest("/api", api_router).merge(page_routes))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
