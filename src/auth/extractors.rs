use crate::auth::client::IdentityClient;
use crate::auth::helpers::extract_cookie;
use crate::auth::session::{AuthState, SESSION_COOKIE};
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

/// Rejections raised while resolving the caller's session
#[derive(Debug)]
pub enum GuardRejection {
    /// Not signed in: send the visitor to the public landing page
    Unauthenticated,
    Internal(String),
}

impl IntoResponse for GuardRejection {
    fn into_response(self) -> Response {
        match self {
            // 303 replaces the guarded URL rather than adding a history entry
            GuardRejection::Unauthenticated => Redirect::to("/").into_response(),
            GuardRejection::Internal(msg) => {
                tracing::error!(error = %msg, "Session resolution failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

fn identity_client(parts: &Parts) -> Result<Arc<IdentityClient>, GuardRejection> {
    parts
        .extensions
        .get::<Arc<IdentityClient>>()
        .cloned()
        .ok_or_else(|| GuardRejection::Internal("Missing IdentityClient extension".to_string()))
}

/// The caller's session, authenticated or not
///
/// Usage:
/// ```rust,ignore
/// async fn handler(CurrentSession { state, .. }: CurrentSession) {
///     if state.is_authenticated { /* ... */ }
/// }
/// ```
pub struct CurrentSession {
    pub session_id: Option<String>,
    pub state: AuthState,
}

impl<S> FromRequestParts<S> for CurrentSession
where
    S: Send + Sync,
{
    type Rejection = GuardRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = identity_client(parts)?;
        let session_id = extract_cookie(&parts.headers, SESSION_COOKIE);
        let state = identity.auth_state(session_id.as_deref()).await;
        Ok(CurrentSession { session_id, state })
    }
}

/// Route guard: only resolves for authenticated sessions, otherwise
/// redirects to `/`.
pub struct RequireAuthenticated {
    pub session_id: String,
    pub state: AuthState,
}

impl<S> FromRequestParts<S> for RequireAuthenticated
where
    S: Send + Sync,
{
    type Rejection = GuardRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let CurrentSession { session_id, state } =
            CurrentSession::from_request_parts(parts, state).await?;

        match session_id {
            Some(session_id) if state.is_authenticated => {
                tracing::debug!(
                    sub = ?state.claims().and_then(|c| c.sub()),
                    path = %parts.uri.path(),
                    "Guarded route access granted"
                );
                Ok(RequireAuthenticated { session_id, state })
            }
            _ => {
                tracing::debug!(
                    path = %parts.uri.path(),
                    "Unauthenticated request to guarded route, redirecting to landing page"
                );
                Err(GuardRejection::Unauthenticated)
            }
        }
    }
}
