//! Authentication handlers for login, callback, and logout
//!
//! - `login_handler`: starts the authorization code flow (PKCE)
//! - `callback_handler`: drives [`CallbackFlow`] for `/login/callback`
//! - `logout_handler`: ends the session and signs out at the identity provider
//!
//! Login and logout failures are logged and the visitor is sent back to the
//! landing page with their session unchanged.

use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use super::callback::{CallbackFlow, CallbackState};
use super::client::CallbackParams;
use super::helpers::{
    clear_session_cookie, extract_cookie, header_value, sanitize_return_path, session_cookie,
};
use super::session::SESSION_COOKIE;
use crate::access::NavView;
use crate::web::templates::{render, render_with_status, CallbackTemplate};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
}

/// Redirect with a Set-Cookie header; 500 if the cookie is not a valid header value
fn redirect_with_cookie(target: &str, cookie: &str) -> Response {
    let mut response = Redirect::to(target).into_response();
    match header_value(cookie) {
        Ok(value) => {
            response.headers_mut().insert(SET_COOKIE, value);
            response
        }
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal error setting response headers",
        )
            .into_response(),
    }
}

/// Login handler - initiates OAuth2 authorization code flow with PKCE
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    headers: HeaderMap,
) -> Response {
    tracing::info!("Login requested");

    let session_id = extract_cookie(&headers, SESSION_COOKIE);
    let original_uri =
        sanitize_return_path(query.return_to.as_deref()).unwrap_or_else(|| "/".to_string());

    match state
        .identity
        .sign_in_with_redirect(session_id.as_deref(), &original_uri)
        .await
    {
        Ok(redirect) => {
            let cookie = session_cookie(&state.config, &redirect.session_id);
            redirect_with_cookie(&redirect.url, &cookie)
        }
        Err(e) => {
            tracing::error!(error = %e, "Login error");
            Redirect::to("/").into_response()
        }
    }
}

/// Callback handler - completes the redirect and routes the visitor onward
pub async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Response {
    tracing::info!(
        has_code = params.code.is_some(),
        has_error = params.error.is_some(),
        "OAuth callback received"
    );

    let identity = &state.identity;
    let session_id = extract_cookie(&headers, SESSION_COOKIE);
    let mut flow = CallbackFlow::new();

    let mut updates = match session_id.as_deref() {
        Some(id) => identity.subscribe(id).await,
        None => None,
    };

    // A session that is already signed in navigates straight away
    flow.on_session_change(&identity.auth_state(session_id.as_deref()).await);

    let (rotated_id, result) = match identity
        .handle_login_redirect(session_id.as_deref(), &params)
        .await
    {
        Ok(done) => (Some(done.session_id), Ok(done.target)),
        Err(e) => (None, Err(e)),
    };
    let current_id = rotated_id.as_deref().or(session_id.as_deref());
    let snapshot = identity.auth_state(current_id).await;
    flow.on_redirect_result(result, &snapshot);

    if let Some(updates) = updates.as_mut() {
        if updates.has_changed().unwrap_or(false) {
            let changed = updates.borrow_and_update().clone();
            flow.on_session_change(&changed);
        }
    }

    match flow.state() {
        CallbackState::Done(target) => {
            tracing::info!(redirect_to = %target, "Authentication complete, redirecting");
            match &rotated_id {
                Some(id) => redirect_with_cookie(target, &session_cookie(&state.config, id)),
                None => Redirect::to(target).into_response(),
            }
        }
        CallbackState::Error(message) => {
            let template = CallbackTemplate {
                nav: NavView::from_state(&snapshot, &state.config.admin_portals),
                error: Some(message.clone()),
            };
            render_with_status(StatusCode::UNAUTHORIZED, &template)
        }
        CallbackState::Pending => {
            let template = CallbackTemplate {
                nav: NavView::from_state(&snapshot, &state.config.admin_portals),
                error: None,
            };
            render(&template)
        }
    }
}

/// Logout handler - drops the portal session, then signs out at the identity provider
pub async fn logout_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let session_id = extract_cookie(&headers, SESSION_COOKIE);

    match state.identity.sign_out(session_id.as_deref()).await {
        Ok(end_session_url) => {
            let target = end_session_url.unwrap_or_else(|| "/".to_string());
            tracing::info!(
                event = "logout_redirect",
                to_identity_provider = target != "/",
                "Logout complete"
            );
            redirect_with_cookie(&target, &clear_session_cookie(&state.config))
        }
        Err(e) => {
            tracing::error!(error = %e, "Logout error");
            Redirect::to("/").into_response()
        }
    }
}
