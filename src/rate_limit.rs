//! Rate limiting for the sign-in relay.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down credential
//! stuffing against the backend.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::api::ApiError;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Rate limiting configuration for the public auth relays.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for sign-in attempts
    pub signin: Arc<IpLimiter>,
    /// Take the client IP from the left-most `X-Forwarded-For` entry
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    /// `signin_per_minute` of zero is treated as one.
    pub fn new(signin_per_minute: u32, trust_forwarded_for: bool) -> Self {
        let per_minute = NonZeroU32::new(signin_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            signin: Arc::new(RateLimiter::keyed(Quota::per_minute(per_minute))),
            trust_forwarded_for,
        }
    }
}

/// How often idle per-IP entries are dropped from the sign-in limiter.
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Spawn a background task that periodically forgets client IPs whose
/// bucket is full again. The task ends once the limiter is dropped.
/// Returns `None` outside a tokio runtime.
pub fn spawn_limiter_pruning(limiter: &Arc<IpLimiter>) -> Option<JoinHandle<()>> {
    let runtime = tokio::runtime::Handle::try_current().ok()?;
    let limiter = Arc::downgrade(limiter);

    Some(runtime.spawn(async move {
        let mut interval = tokio::time::interval(PRUNE_INTERVAL);
        interval.tick().await;

        loop {
            interval.tick().await;
            let Some(limiter) = limiter.upgrade() else {
                break;
            };
            limiter.retain_recent();
            limiter.shrink_to_fit();
            debug!(tracked = limiter.len(), "Pruned sign-in rate limiter");
        }
    }))
}

/// Extract the client IP.
///
/// With `trust_forwarded_for` the header is required; there is no fallback
/// to the socket address, which would be the proxy's.
pub fn extract_client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trust_forwarded_for: bool,
) -> Result<String, &'static str> {
    if trust_forwarded_for {
        let value = headers
            .get("x-forwarded-for")
            .ok_or("X-Forwarded-For not present")?
            .to_str()
            .map_err(|_| "X-Forwarded-For contains invalid characters")?;
        let first = value
            .split(',')
            .next()
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .ok_or("X-Forwarded-For is empty")?;
        return first
            .parse::<std::net::IpAddr>()
            .map(|ip| ip.to_string())
            .map_err(|_| "X-Forwarded-For is not an IP address");
    }

    connect_info
        .map(|ci| ci.0.ip().to_string())
        .ok_or("No client IP available")
}

/// Middleware for rate limiting sign-in attempts.
pub async fn rate_limit_signin(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(
        request.headers(),
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
        config.trust_forwarded_for,
    ) {
        Ok(ip) => ip,
        Err(reason) => {
            warn!(reason, "Rejecting sign-in without client IP");
            return ApiError::forbidden("Unable to determine client IP.").into_response();
        }
    };

    match config.signin.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Sign-in rate limit exceeded");
            ApiError::too_many_requests(
                "Too many sign-in attempts. Please wait before trying again.",
            )
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn forwarded(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_socket_address_when_not_trusting_proxy() {
        let ci = ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4321)));
        let ip = extract_client_ip(&forwarded("1.2.3.4"), Some(&ci), false).unwrap();
        assert_eq!(ip, "10.0.0.7");
    }

    #[test]
    fn test_left_most_forwarded_entry() {
        let ip = extract_client_ip(&forwarded("203.0.113.9, 10.0.0.1"), None, true).unwrap();
        assert_eq!(ip, "203.0.113.9");
    }

    #[test]
    fn test_missing_sources_are_errors() {
        assert!(extract_client_ip(&HeaderMap::new(), None, false).is_err());
        assert!(extract_client_ip(&HeaderMap::new(), None, true).is_err());
        assert!(extract_client_ip(&forwarded("not-an-ip"), None, true).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pruning_stops_with_limiter() {
        let config = RateLimitConfig::new(5, false);
        let handle = spawn_limiter_pruning(&config.signin).unwrap();

        tokio::time::sleep(PRUNE_INTERVAL * 2).await;
        assert!(!handle.is_finished());

        drop(config);
        tokio::time::sleep(PRUNE_INTERVAL + Duration::from_secs(1)).await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_pruning_needs_runtime() {
        let config = RateLimitConfig::new(5, false);
        assert!(spawn_limiter_pruning(&config.signin).is_none());
    }

    #[test]
    fn test_quota_exhausts_per_ip() {
        let config = RateLimitConfig::new(2, false);
        let a = "10.0.0.1".to_string();
        let b = "10.0.0.2".to_string();
        assert!(config.signin.check_key(&a).is_ok());
        assert!(config.signin.check_key(&a).is_ok());
        assert!(config.signin.check_key(&a).is_err());
        assert!(config.signin.check_key(&b).is_ok());
    }
}
