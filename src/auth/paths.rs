//! Path tables the gate consults: matcher exclusions, public pages, and the
//! pages a post-sign-in redirect may land on.

use axum::http::HeaderValue;

use crate::cli::Environment;

pub const SIGNIN_PATH: &str = "/signin";

/// Where an authenticated visitor of the sign-in page goes by default.
pub const DEFAULT_DESTINATION: &str = "/instances";

/// Paths that never run the gate. Matched as prefixes of the path with its
/// leading slash removed.
pub const MATCHER_EXCLUSIONS: &[&str] = &[
    "api/action",
    "api/signup",
    "api/signin",
    "api/reset-password",
    "api/provider-details",
    "idp-auth",
    "api/sign-in-with-idp",
    "privacy-policy",
    "cookie-policy",
    "terms-of-use",
    "favicon.ico",
    "_next/image",
    "_next/static",
    "static",
    "validate-token",
];

/// Pages reachable without a session outside prod.
pub const PUBLIC_PREFIXES: &[&str] = &["/signup", "/reset-password", "/change-password"];

/// Dashboard pages. A `destination` must name one of these (or a sub-path).
pub const KNOWN_PAGES: &[&str] = &[
    "/instances",
    "/subscriptions",
    "/billing",
    "/cloud-accounts",
    "/custom-networks",
    "/access-control",
    "/usage",
    "/notifications",
    "/settings",
    "/service-plans",
];

pub fn is_matcher_excluded(path: &str) -> bool {
    let stripped = path.strip_prefix('/').unwrap_or(path);
    MATCHER_EXCLUSIONS
        .iter()
        .any(|excluded| stripped.starts_with(excluded))
}

/// Public pages skip the gate everywhere except prod.
pub fn is_public(path: &str, environment: Environment) -> bool {
    !environment.is_prod() && PUBLIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

pub fn is_signin(path: &str) -> bool {
    path.starts_with(SIGNIN_PATH)
}

/// Whether `path` (without query) is a dashboard page or below one.
pub fn is_known_page(path: &str) -> bool {
    KNOWN_PAGES.iter().any(|page| {
        path == *page
            || path
                .strip_prefix(page)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Resolve the post-sign-in redirect from the request query string.
/// Only same-origin dashboard pages that can be sent back as a `Location`
/// header are accepted; the query string of the destination itself is kept.
pub fn resolve_destination(query: Option<&str>) -> String {
    let destination = query.and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "destination")
            .map(|(_, value)| value.into_owned())
    });

    match destination {
        Some(destination) => {
            let path = destination
                .split(['?', '#'])
                .next()
                .unwrap_or_default();
            if is_known_page(path) && HeaderValue::from_str(&destination).is_ok() {
                destination
            } else {
                DEFAULT_DESTINATION.to_string()
            }
        }
        None => DEFAULT_DESTINATION.to_string(),
    }
}
