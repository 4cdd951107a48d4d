
use super::admin::{admin_portal_link, AdminPortalUrls};
use crate::auth::session::AuthState;

/// Navigation bar model for UI rendering
///
/// Derived purely from the current session snapshot; holds no state of its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavView {
    /// Whether the protected page and logout button are shown
    pub authenticated: bool,
    /// External admin portal link, when the user qualifies
    pub admin_url: Option<String>,
}

impl NavView {
    pub fn from_state(state: &AuthState, admin_portals: &AdminPortalUrls) -> Self {
        let admin_url = state
            .claims()
            .and_then(|claims| admin_portal_link(claims, admin_portals))
            .map(str::to_string);

        NavView {
            authenticated: state.is_authenticated,
            admin_url,
        }
    }
}
