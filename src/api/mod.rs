mod action;
mod auth;
mod config;
mod error;

use axum::Router;
use std::sync::Arc;

use crate::backend::Backend;
use crate::cli::Environment;
use crate::rate_limit::RateLimitConfig;

pub use error::ApiError;

/// Everything the API routes need from the server configuration.
#[derive(Clone)]
pub struct ApiState {
    pub backend: Arc<Backend>,
    pub environment: Environment,
    pub analytics_id: Option<String>,
    pub rate_limits: Arc<RateLimitConfig>,
}

/// Create the API router.
pub fn create_api_router(state: ApiState) -> Router {
    let action_state = action::ActionState {
        backend: state.backend.clone(),
    };

    let relay_state = auth::AuthRelayState {
        backend: state.backend,
    };

    let config_state = config::ConfigState {
        environment: state.environment,
        analytics_id: state.analytics_id,
    };

    Router::new()
        .nest("/action", action::router(action_state))
        .nest(
            "/signin",
            auth::signin_router(relay_state.clone(), state.rate_limits),
        )
        .nest("/signup", auth::signup_router(relay_state.clone()))
        .nest("/reset-password", auth::reset_password_router(relay_state))
        .nest("/config", config::router(config_state))
}
