//! Pure helper functions for authentication
//!
//! Stateless helpers for URL building, cookie handling and HTTP clients.

use axum::http::{header::InvalidHeaderValue, HeaderMap, HeaderValue};
use std::time::Duration;

use super::session::SESSION_COOKIE;
use crate::config::Config;

// =============================================================================
// HTTP Client Builders
// =============================================================================

/// Create a reqwest client for OIDC HTTP requests using config timeouts
pub fn create_http_client(
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none()) // Security: prevent SSRF
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(request_timeout_secs))
        .build()
}

// =============================================================================
// URL Builders
// =============================================================================

/// Build the RP-initiated logout URL
///
/// Providers require either `id_token_hint` or `client_id` alongside
/// `post_logout_redirect_uri`. We prefer `id_token_hint` when the caller has
/// an unexpired token, falling back to `client_id`.
pub fn build_end_session_url(
    end_session_endpoint: &str,
    client_id: &str,
    post_logout_redirect_uri: &str,
    id_token_hint: Option<&str>,
) -> String {
    let post_logout_redirect = urlencoding::encode(post_logout_redirect_uri);
    let separator = if end_session_endpoint.contains('?') { '&' } else { '?' };

    match id_token_hint.filter(|t| !t.trim().is_empty()) {
        Some(id_token) => format!(
            "{}{}id_token_hint={}&post_logout_redirect_uri={}",
            end_session_endpoint,
            separator,
            urlencoding::encode(id_token),
            post_logout_redirect
        ),
        None => format!(
            "{}{}client_id={}&post_logout_redirect_uri={}",
            end_session_endpoint,
            separator,
            urlencoding::encode(client_id),
            post_logout_redirect
        ),
    }
}

/// Accept only local absolute paths as post-login targets (no open redirects)
pub fn sanitize_return_path(candidate: Option<&str>) -> Option<String> {
    let path = candidate?.trim();
    if !path.starts_with('/') || path.starts_with("//") || path.contains('\\') {
        return None;
    }
    Some(path.to_string())
}

// =============================================================================
// Cookies
// =============================================================================

/// Extract a cookie value from headers
///
/// Handles multiple Cookie headers (some proxies fold/duplicate headers).
/// Uses `get_all` to collect all Cookie header values.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);

    for header_value in headers.get_all("cookie") {
        if let Ok(cookie_str) = header_value.to_str() {
            if let Some(value) = cookie_str
                .split(';')
                .map(|c| c.trim())
                .find(|c| c.starts_with(&prefix))
                .and_then(|c| c.strip_prefix(&prefix))
            {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Session cookie (browser-session lifetime, HttpOnly, Lax)
pub fn session_cookie(config: &Config, session_id: &str) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax{}{}",
        SESSION_COOKIE,
        session_id,
        config.cookie_domain_attr(),
        config.cookie_secure_flag()
    )
}

/// Expire the session cookie
pub fn clear_session_cookie(config: &Config) -> String {
    format!(
        "{}=; HttpOnly; Path=/; Max-Age=0; SameSite=Lax{}{}",
        SESSION_COOKIE,
        config.cookie_domain_attr(),
        config.cookie_secure_flag()
    )
}

/// Create a HeaderValue from a string, logging instead of panicking on malformed input
pub fn header_value(s: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    HeaderValue::from_str(s).inspect_err(|e| {
        tracing::error!(
            error = %e,
            value_len = s.len(),
            "Failed to create header value"
        );
    })
}

// =============================================================================
// Tests
// =============================================================================
