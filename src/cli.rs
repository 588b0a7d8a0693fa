//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use clap::Parser;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, warn};
use url::Url;

/// Default timeout for calls the edge makes to the backend.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Deployment mode. Parsed once at startup and passed to everything that
/// branches on it.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Environment {
    #[default]
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn is_prod(self) -> bool {
        self == Environment::Prod
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "portal-gate",
    about = "Edge server for the SaaS portal: auth gate and same-origin API proxy"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000", env = "PORTAL_PORT")]
    pub port: u16,

    /// Base URL of the portal REST backend (e.g., "https://api.example.com/2022-09-01-00")
    #[arg(long, env = "PORTAL_BACKEND_URL")]
    pub backend_url: String,

    /// Deployment mode. In prod the sign-up and password pages are gated too
    #[arg(short, long, value_enum, default_value = "dev", env = "PORTAL_ENVIRONMENT")]
    pub environment: Environment,

    /// Analytics tag identifier. Enables the analytics consent category when set
    #[arg(long, env = "GOOGLE_ANALYTICS_TAG_ID")]
    pub analytics_id: Option<String>,

    /// Timeout in seconds for backend calls made by the edge (session check and relay)
    #[arg(long, default_value_t = DEFAULT_UPSTREAM_TIMEOUT_SECS)]
    pub upstream_timeout_secs: u64,

    /// Maximum sign-in attempts per client IP per minute
    #[arg(long, default_value = "10")]
    pub signin_rate_limit: u32,

    /// Take the client IP from X-Forwarded-For (only behind a trusted reverse proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Add a random nonce to the CSP header of each page shell
    #[arg(long)]
    pub csp_nonce: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Parse and validate the backend URL.
/// Returns None and logs an error if validation fails.
pub fn validate_backend_url(backend_url: &str, environment: Environment) -> Option<Url> {
    let url = match Url::parse(backend_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %backend_url, error = %e, "Invalid backend URL");
            return None;
        }
    };

    match url.scheme() {
        "https" => {}
        "http" => {
            let is_local = matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"));
            if environment.is_prod() && !is_local {
                error!(url = %backend_url, "Backend URL must use HTTPS in prod");
                return None;
            }
            if !is_local {
                warn!(url = %backend_url, "Backend URL is not using HTTPS");
            }
        }
        other => {
            error!(url = %backend_url, scheme = %other, "Backend URL must be http or https");
            return None;
        }
    }

    if url.query().is_some() || url.fragment().is_some() {
        error!(url = %backend_url, "Backend URL must not carry a query or fragment");
        return None;
    }

    Some(url)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, backend_url: Url) -> ServerConfig {
    let analytics_id = args
        .analytics_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    ServerConfig {
        backend_url,
        environment: args.environment,
        analytics_id,
        upstream_timeout: Duration::from_secs(args.upstream_timeout_secs.max(1)),
        signin_rate_limit: args.signin_rate_limit.max(1),
        trust_forwarded_for: args.trust_forwarded_for,
        csp_nonce: args.csp_nonce,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["portal-gate", "--backend-url", "https://api.example.com"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn test_defaults() {
        let args = args(&[]);
        assert_eq!(args.port, 3000);
        assert_eq!(args.environment, Environment::Dev);
        assert_eq!(args.upstream_timeout_secs, DEFAULT_UPSTREAM_TIMEOUT_SECS);
        assert!(args.analytics_id.is_none());
    }

    #[test]
    fn test_environment_flag() {
        let args = args(&["--environment", "prod"]);
        assert!(args.environment.is_prod());
    }

    #[test]
    fn test_backend_url_validation() {
        assert!(validate_backend_url("https://api.example.com/v1", Environment::Prod).is_some());
        assert!(validate_backend_url("http://localhost:8080", Environment::Prod).is_some());
        assert!(validate_backend_url("http://api.example.com", Environment::Prod).is_none());
        assert!(validate_backend_url("http://api.example.com", Environment::Dev).is_some());
        assert!(validate_backend_url("ftp://api.example.com", Environment::Dev).is_none());
        assert!(validate_backend_url("https://api.example.com?x=1", Environment::Dev).is_none());
        assert!(validate_backend_url("not a url", Environment::Dev).is_none());
    }

    #[test]
    fn test_build_config_drops_blank_analytics_id() {
        let args = args(&["--analytics-id", "   "]);
        let url = Url::parse("https://api.example.com").unwrap();
        let config = build_config(&args, url);
        assert!(config.analytics_id.is_none());
    }

    #[test]
    fn test_environment_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Environment::Prod).unwrap(), "\"PROD\"");
    }
}
