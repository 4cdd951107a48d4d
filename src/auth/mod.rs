//! Authentication module
//!
//! OIDC authorization code flow (PKCE) against a single identity provider,
//! with per-visitor sessions held in memory.
//!
//! ## Structure
//!
//! - `client`: the identity client owning sessions and the sign-in lifecycle
//! - `provider`: the identity provider seam, `oidc` is the real implementation
//! - `jwt`: ID token validation against the provider's cached JWKS
//! - `session`: observable per-visitor authentication state
//! - `callback`: state machine behind `/login/callback`
//! - `extractors`: Axum extractors and the `/protected` route guard
//! - `handlers`: HTTP handlers for login, callback, and logout
//!
//! ## Authentication Flow
//!
//! 1. Visitor posts `/login` → redirect to the provider's authorize endpoint
//! 2. Provider authenticates → redirect to `/login/callback?code=..&state=..`
//! 3. Portal exchanges the code, validates the ID token → redirect to `/protected`
//! 4. Visitor posts `/logout` → session dropped → provider end-session endpoint

pub mod callback;
pub mod claims;
pub mod client;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod helpers;
pub mod jwt;
pub mod oidc;
pub mod provider;
pub mod session;

pub use client::{CallbackParams, ClientSettings, IdentityClient};
pub use error::IdentityError;
pub use handlers::{callback_handler, login_handler, logout_handler, LoginQuery};
pub use session::AuthState;
