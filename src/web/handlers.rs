use super::templates::{render, LandingTemplate, ProtectedTemplate};
use crate::access::NavView;
use crate::auth::extractors::{CurrentSession, RequireAuthenticated};
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Liveness probe - always returns OK if the process is running
pub async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe - 200 once the identity provider signing keys are cached
pub async fn readyz_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.identity.is_ready().await {
        (StatusCode::OK, "ready")
    } else {
        tracing::warn!("Readiness check failed: JWKS not cached");
        (StatusCode::SERVICE_UNAVAILABLE, "not ready: JWKS not cached")
    }
}

pub async fn landing_handler(
    State(state): State<Arc<AppState>>,
    CurrentSession { state: session, .. }: CurrentSession,
) -> Response {
    let template = LandingTemplate {
        nav: NavView::from_state(&session, &state.config.admin_portals),
    };
    render(&template)
}

pub async fn protected_handler(
    State(state): State<Arc<AppState>>,
    RequireAuthenticated { state: session, .. }: RequireAuthenticated,
) -> Response {
    let nav = NavView::from_state(&session, &state.config.admin_portals);
    let (display_name, claims) = match session.claims() {
        Some(claims) => (claims.display_name(), claims.rows()),
        None => (String::new(), Vec::new()),
    };

    tracing::debug!(
        claim_count = claims.len(),
        admin_link = nav.admin_url.is_some(),
        "Rendering protected page"
    );

    render(&ProtectedTemplate {
        nav,
        display_name,
        claims,
    })
}
