use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use std::sync::LazyLock;

/// Build a CSP header from directive key-value pairs
fn build_csp(directives: &[(&str, &str)]) -> String {
    directives
        .iter()
        .map(|(key, value)| format!("{} {}", key, value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// CSP for page shells. Scripts and styles come from the portal's own origin,
/// analytics from the tag manager once consent is granted.
pub static PAGE_CSP_HEADER: LazyLock<String> = LazyLock::new(|| {
    build_csp(&[
        ("default-src", "'self'"),
        ("script-src", "'self' https://www.googletagmanager.com"),
        ("style-src", "'self' 'unsafe-inline'"),
        ("img-src", "'self' data: https:"),
        (
            "connect-src",
            "'self' https://www.google-analytics.com https://*.google-analytics.com",
        ),
        ("frame-ancestors", "'none'"),
        ("form-action", "'self'"),
        ("base-uri", "'self'"),
    ])
});

/// Generate a random 128-bit nonce as base64
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

/// Insert a nonce at the front of the script-src directive
pub fn csp_with_nonce(base_csp: &str, nonce: &str) -> String {
    match base_csp.find("script-src ") {
        Some(pos) => {
            let insert_at = pos + "script-src ".len();
            format!(
                "{}'nonce-{}' {}",
                &base_csp[..insert_at],
                nonce,
                &base_csp[insert_at..]
            )
        }
        None => base_csp.to_string(),
    }
}
