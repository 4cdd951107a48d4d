use crate::access::NavView;
use crate::auth::claims::ClaimRow;
use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

#[derive(Template)]
#[template(path = "landing.html")]
pub struct LandingTemplate {
    pub nav: NavView,
}

#[derive(Template)]
#[template(path = "protected.html")]
pub struct ProtectedTemplate {
    pub nav: NavView,
    pub display_name: String,
    pub claims: Vec<ClaimRow>,
}

/// `/login/callback` page: "Processing login..." or the error view
#[derive(Template)]
#[template(path = "callback.html")]
pub struct CallbackTemplate {
    pub nav: NavView,
    pub error: Option<String>,
}

pub fn render<T: Template>(template: &T) -> Response {
    render_with_status(StatusCode::OK, template)
}

pub fn render_with_status<T: Template>(status: StatusCode, template: &T) -> Response {
    match template.render() {
        Ok(html) => (status, Html(html)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Template rendering failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
        }
    }
}
