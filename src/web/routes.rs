use super::handlers::{healthz_handler, landing_handler, protected_handler, readyz_handler};
use crate::{
    auth::{callback_handler, login_handler, logout_handler},
    AppState,
};
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_http::{services::ServeDir, trace::TraceLayer};

pub fn create_router(state: Arc<AppState>) -> Router {
    let identity = state.identity.clone();

    Router::new()
        .route("/", get(landing_handler))
        .route("/protected", get(protected_handler))
        .route("/login", get(login_handler).post(login_handler))
        .route("/login/callback", get(callback_handler))
        .route("/logout", post(logout_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .nest_service("/static", ServeDir::new("static"))
        .layer(Extension(identity))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
