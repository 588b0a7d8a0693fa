//! Cookie parsing and session cookie construction for the edge.

use axum::http::{HeaderMap, header};

use crate::session::TOKEN_COOKIE_NAME;

/// Extract a cookie value from the Cookie header(s).
/// Empty values are treated as absent.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value storing the session token after a sign-in.
/// Not HttpOnly: the portal client reads the token to decide whether calls
/// to protected endpoints may leave the browser.
pub fn session_cookie(token: &str, max_age: Option<u64>) -> String {
    let mut cookie = format!("{}={}; Path=/; SameSite=Lax; Secure", TOKEN_COOKIE_NAME, token);
    if let Some(max_age) = max_age {
        cookie.push_str(&format!("; Max-Age={}", max_age));
    }
    cookie
}

/// `Set-Cookie` value that removes the session token.
pub fn expired_session_cookie() -> String {
    format!("{}=; Path=/; SameSite=Lax; Secure; Max-Age=0", TOKEN_COOKIE_NAME)
}
