//! Backend route tables the interceptor consults.
//!
//! These mirror the backend's public routes by hand. A route added to the
//! backend without a session requirement must be added here too, or calls to
//! it are aborted for signed-out visitors.

use regex::Regex;
use std::sync::LazyLock;

/// Backend prefixes callable without a session token.
pub const NON_PROTECTED_PREFIXES: &[&str] = &[
    "/change-password",
    "/contactus",
    "/health",
    "/json-schema",
    "/login-with-identity-provider",
    "/reset-password",
    "/resource-instance/health",
    "/resource-instance/version",
    "/signin",
    "/signup",
    "/validate-token",
    "/version",
    "/logout",
];

/// Endpoints the sign-in form talks to. A 401 from these is a wrong
/// password, not an expired session.
pub const SIGNIN_ENDPOINTS: &[&str] = &["/signin", "/api/signin"];

pub const LOGOUT_ENDPOINT: &str = "/logout";

/// Same-origin prefix. Calls under it are never wrapped in an envelope.
pub const SAME_ORIGIN_PREFIX: &str = "/api";

static CLI_DOWNLOAD: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"^/service/[^/]+/api-version/[^/]+/cli-download").ok()
});

/// Path part of a call url, without query or fragment.
pub fn path_of(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or_default()
}

pub fn is_protected(path: &str) -> bool {
    !NON_PROTECTED_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

/// CLI binaries are downloaded straight from the backend.
pub fn is_cli_download(path: &str) -> bool {
    CLI_DOWNLOAD
        .as_ref()
        .is_some_and(|re| re.is_match(path))
}

pub fn is_absolute(url: &str) -> bool {
    url.starts_with("//") || url::Url::parse(url).is_ok()
}

pub fn is_signin_endpoint(path: &str) -> bool {
    SIGNIN_ENDPOINTS.contains(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protection() {
        assert!(!is_protected("/resource-instance/version"));
        assert!(!is_protected("/signin"));
        assert!(!is_protected("/logout"));
        assert!(is_protected("/resource-instance/inst-1"));
        assert!(is_protected("/user"));
        assert!(is_protected("/subscriptions"));
    }

    #[test]
    fn test_cli_download_matcher() {
        assert!(is_cli_download("/service/svc-1/api-version/v2/cli-download"));
        assert!(is_cli_download("/service/svc-1/api-version/v2/cli-download/linux"));
        assert!(!is_cli_download("/service/svc-1/cli-download"));
        assert!(!is_cli_download("/x/service/a/api-version/b/cli-download"));
    }

    #[test]
    fn test_absolute_urls() {
        assert!(is_absolute("https://cdn.example.com/file"));
        assert!(is_absolute("//cdn.example.com/file"));
        assert!(!is_absolute("/user"));
    }

    #[test]
    fn test_path_of() {
        assert_eq!(path_of("/subscription?serviceId=1"), "/subscription");
        assert_eq!(path_of("/user"), "/user");
    }
}
