use super::create_router;
use crate::auth::client::tests::settings;
use crate::auth::provider::testing::{FakeProvider, GOOD_CODE};
use crate::auth::IdentityClient;
use crate::config::Config;
use crate::AppState;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::json;
use std::sync::Arc;
use tower::ServiceExt;

/// Path segment of the default partner admin portal URL
const PARTNER_ADMIN_APP: &str = "guoo1sbgvmBzqsXI31d7";

struct Harness {
    router: Router,
    provider: Arc<FakeProvider>,
}

fn test_config() -> Config {
    Config::load_from(|key| match key {
        "OIDC_ISSUER" => Some("https://login.atko.test/oauth2/default".to_string()),
        "OIDC_CLIENT_ID" => Some("0oa-portal".to_string()),
        "PORTAL_PUBLIC_URL" => Some("http://localhost:3000".to_string()),
        _ => None,
    })
    .unwrap()
}

fn harness(provider: FakeProvider) -> Harness {
    let provider = Arc::new(provider);
    let identity = Arc::new(IdentityClient::new(provider.clone(), settings()));
    let state = Arc::new(AppState {
        config: Arc::new(test_config()),
        identity,
    });
    Harness {
        router: create_router(state),
        provider,
    }
}

async fn send(router: &Router, method: Method, uri: &str, cookie: Option<&str>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    router
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// `name=value` part of the Set-Cookie header
fn cookie_pair(response: &Response) -> String {
    let raw = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap();
    raw.split(';').next().unwrap().to_string()
}

fn query_param(url: &str, name: &str) -> String {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

/// Session cookies before and after a completed sign-in
struct SignedIn {
    pre_login: String,
    cookie: String,
}

/// POST /login then follow the callback
async fn sign_in_with_cookies(h: &Harness) -> SignedIn {
    let login = send(&h.router, Method::POST, "/login", None).await;
    assert_eq!(login.status(), StatusCode::SEE_OTHER);
    let pre_login = cookie_pair(&login);
    let state = query_param(location(&login), "state");

    let callback = send(
        &h.router,
        Method::GET,
        &format!("/login/callback?code={}&state={}", GOOD_CODE, state),
        Some(&pre_login),
    )
    .await;
    assert_eq!(callback.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&callback), "/protected");
    let cookie = cookie_pair(&callback);
    SignedIn { pre_login, cookie }
}

/// Sign in and return the authenticated session cookie
async fn sign_in(h: &Harness) -> String {
    sign_in_with_cookies(h).await.cookie
}

#[tokio::test]
async fn test_healthz_and_readyz() {
    let h = harness(FakeProvider::partner_admin());
    assert_eq!(send(&h.router, Method::GET, "/healthz", None).await.status(), StatusCode::OK);
    assert_eq!(send(&h.router, Method::GET, "/readyz", None).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_redirects_anonymous_visitor_home() {
    let h = harness(FakeProvider::partner_admin());

    let response = send(&h.router, Method::GET, "/protected", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let unknown = send(&h.router, Method::GET, "/protected", Some("portal_session=forged")).await;
    assert_eq!(unknown.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&unknown), "/");
}

#[tokio::test]
async fn test_landing_has_single_login_affordance_when_anonymous() {
    let h = harness(FakeProvider::partner_admin());

    let body = body_text(send(&h.router, Method::GET, "/", None).await).await;
    assert!(body.contains("Atko Insurance Partner Portal"));
    assert!(body.contains("Ready to Get Started?"));
    assert!(body.contains("Welcome to Atko Insurance Partner Portal"));
    assert!(body.contains("For support, please contact:"));
    assert!(body.contains("support@atko.com"));
    assert_eq!(body.matches("action=\"/login\"").count(), 1);
    assert!(!body.contains("Protected Page"));
    assert!(!body.contains("action=\"/logout\""));
}

#[tokio::test]
async fn test_login_redirects_to_identity_provider_with_pkce() {
    let h = harness(FakeProvider::partner_admin());

    let response = send(&h.router, Method::POST, "/login", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("https://idp.test/authorize?"));
    assert_eq!(query_param(location(&response), "pkce"), "true");
    assert!(cookie_pair(&response).starts_with("portal_session="));
}

#[tokio::test]
async fn test_full_sign_in_shows_claims_and_admin_link() {
    let h = harness(FakeProvider::partner_admin());
    let cookie = sign_in(&h).await;

    let response = send(&h.router, Method::GET, "/protected", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Pat Partner"));
    assert!(body.contains("userCategory"));
    assert!(body.contains(PARTNER_ADMIN_APP));
    assert!(body.contains("rel=\"noopener noreferrer\""));

    let landing = body_text(send(&h.router, Method::GET, "/", Some(&cookie)).await).await;
    assert_eq!(landing.matches("action=\"/login\"").count(), 0);
    assert!(landing.contains("action=\"/logout\""));
}

#[tokio::test]
async fn test_sign_in_replaces_pre_login_session_cookie() {
    let h = harness(FakeProvider::partner_admin());
    let SignedIn { pre_login, cookie } = sign_in_with_cookies(&h).await;

    assert!(cookie.starts_with("portal_session="));
    assert_ne!(cookie, pre_login);

    let stale = send(&h.router, Method::GET, "/protected", Some(&pre_login)).await;
    assert_eq!(stale.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&stale), "/");

    let fresh = send(&h.router, Method::GET, "/protected", Some(&cookie)).await;
    assert_eq!(fresh.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_expired_id_token_renders_error_view() {
    let h = harness(FakeProvider::new(json!({
        "sub": "00u-late",
        "name": "Late Larry",
        "exp": crate::auth::claims::unix_now() - 1
    })));
    let login = send(&h.router, Method::POST, "/login", None).await;
    let cookie = cookie_pair(&login);
    let state = query_param(location(&login), "state");

    let response = send(
        &h.router,
        Method::GET,
        &format!("/login/callback?code={}&state={}", GOOD_CODE, state),
        Some(&cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_text(response).await;
    assert!(body.contains("Error during login"));
    assert!(!body.contains("Processing login..."));
}

#[tokio::test]
async fn test_forged_callback_does_not_cancel_login_in_flight() {
    let h = harness(FakeProvider::partner_admin());
    let login = send(&h.router, Method::POST, "/login", None).await;
    let cookie = cookie_pair(&login);
    let state = query_param(location(&login), "state");

    let forged = send(
        &h.router,
        Method::GET,
        &format!("/login/callback?code={}&state=forged", GOOD_CODE),
        Some(&cookie),
    )
    .await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.provider.exchange_count(), 0);

    let real = send(
        &h.router,
        Method::GET,
        &format!("/login/callback?code={}&state={}", GOOD_CODE, state),
        Some(&cookie),
    )
    .await;
    assert_eq!(real.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&real), "/protected");
}

#[tokio::test]
async fn test_admin_link_hidden_for_regular_user() {
    let h = harness(FakeProvider::new(json!({
        "sub": "00u-agent",
        "name": "Alex Agent",
        "exp": i64::MAX / 2,
        "userCategory": "partner",
        "isAdmin": false
    })));
    let cookie = sign_in(&h).await;

    let body = body_text(send(&h.router, Method::GET, "/protected", Some(&cookie)).await).await;
    assert!(body.contains("Alex Agent"));
    assert!(!body.contains(PARTNER_ADMIN_APP));
}

#[tokio::test]
async fn test_replayed_callback_navigates_without_second_exchange() {
    let h = harness(FakeProvider::partner_admin());
    let cookie = sign_in(&h).await;

    let replay = send(
        &h.router,
        Method::GET,
        "/login/callback?code=good-code&state=whatever",
        Some(&cookie),
    )
    .await;
    assert_eq!(replay.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&replay), "/protected");
    assert_eq!(h.provider.exchange_count(), 1);
}

#[tokio::test]
async fn test_failed_exchange_renders_error_view() {
    let h = harness(FakeProvider::partner_admin());
    let login = send(&h.router, Method::POST, "/login", None).await;
    let cookie = cookie_pair(&login);
    let state = query_param(location(&login), "state");

    let response = send(
        &h.router,
        Method::GET,
        &format!("/login/callback?code=bad-code&state={}", state),
        Some(&cookie),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::LOCATION).is_none());
    let body = body_text(response).await;
    assert!(body.contains("Error during login"));
    assert!(body.contains("Failed to complete authentication. Please try again."));
    assert!(body.contains("Return to Home"));

    let protected = send(&h.router, Method::GET, "/protected", Some(&cookie)).await;
    assert_eq!(location(&protected), "/");
}

#[tokio::test]
async fn test_callback_without_session_shows_error() {
    let h = harness(FakeProvider::partner_admin());

    let response = send(&h.router, Method::GET, "/login/callback", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_text(response).await.contains("Return to Home"));
}

#[tokio::test]
async fn test_logout_clears_session_and_signs_out_at_provider() {
    let h = harness(FakeProvider::partner_admin());
    let cookie = sign_in(&h).await;

    let response = send(&h.router, Method::POST, "/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with("https://idp.test/logout?hint=true"));
    assert_eq!(cookie_pair(&response), "portal_session=");

    let protected = send(&h.router, Method::GET, "/protected", Some(&cookie)).await;
    assert_eq!(protected.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&protected), "/");
}

#[tokio::test]
async fn test_logout_without_end_session_endpoint_goes_home() {
    let mut provider = FakeProvider::partner_admin();
    provider.end_session = None;
    let h = harness(provider);
    let cookie = sign_in(&h).await;

    let response = send(&h.router, Method::POST, "/logout", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn test_login_failure_returns_home_without_cookie() {
    let mut provider = FakeProvider::partner_admin();
    provider.fail_authorize = true;
    let h = harness(provider);

    let response = send(&h.router, Method::POST, "/login", None).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(response.headers().get(header::SET_COOKIE).is_none());
}
