//! Page routes.
//!
//! Rendering happens in the browser; the edge only serves a mount-point
//! shell per page so the gate has something to guard. Unknown paths get the
//! same shell with a 404 status.

mod csp;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Redirect, Response},
    routing::get,
};

use crate::auth::{DEFAULT_DESTINATION, KNOWN_PAGES};
use csp::{PAGE_CSP_HEADER, csp_with_nonce, generate_nonce};

/// Cache duration for HTML shells (no cache, always revalidate)
pub const NO_CACHE: &str = "no-cache";

/// Pages served without a dashboard session.
const PUBLIC_PAGES: &[&str] = &[
    "/signin",
    "/signup",
    "/reset-password",
    "/change-password",
    "/validate-token",
    "/privacy-policy",
    "/cookie-policy",
    "/terms-of-use",
];

#[derive(Clone)]
pub struct PagesState {
    pub csp_nonce: bool,
}

pub fn router(state: PagesState) -> Router {
    Router::new()
        .route("/", get(Redirect::temporary(DEFAULT_DESTINATION)))
        .fallback(serve_page)
        .with_state(state)
}

/// Name of the page owning `path`, if any.
fn page_for(path: &str) -> Option<&'static str> {
    PUBLIC_PAGES
        .iter()
        .chain(KNOWN_PAGES.iter())
        .copied()
        .find(|page| {
            path == *page
                || path
                    .strip_prefix(*page)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
        .map(|page| page.trim_start_matches('/'))
}

async fn serve_page(State(state): State<PagesState>, uri: Uri) -> Response {
    let (status, page) = match page_for(uri.path()) {
        Some(page) => (StatusCode::OK, page),
        None => (StatusCode::NOT_FOUND, "not-found"),
    };

    let (csp, nonce_attr) = if state.csp_nonce {
        let nonce = generate_nonce();
        (
            csp_with_nonce(&PAGE_CSP_HEADER, &nonce),
            format!(r#" nonce="{}""#, nonce),
        )
    } else {
        (PAGE_CSP_HEADER.clone(), String::new())
    };

    let body = format!(
        r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width, initial-scale=1"><title>Portal</title><link rel="stylesheet" href="/static/app.css"></head>
<body><div id="root" data-page="{page}"></div><script type="module" src="/static/app.js"{nonce_attr}></script></body>
</html>
"#
    );

    (
        status,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (header::CACHE_CONTROL, NO_CACHE.to_string()),
            (header::CONTENT_SECURITY_POLICY, csp),
        ],
        body,
    )
        .into_response()
}
