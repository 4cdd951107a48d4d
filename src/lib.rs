//! Partner portal service library
//!
//! Provides the core functionality for the Atko Insurance partner portal:
//! OIDC sign-in, the guarded claims page, and the admin portal link.

#![deny(dead_code)]

pub mod access;
pub mod auth;
pub mod config;
pub mod web;

use auth::client::IdentityClient;
use config::Config;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Also installed as an `Extension` for the session extractors
    pub identity: Arc<IdentityClient>,
}
