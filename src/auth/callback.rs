//! Login callback state machine
//!
//! ```text
//! Pending ── failure (other than a benign replay while signed in) ──► Error
//! Pending | Error ── authenticated snapshot observed ──► Done(target)
//! ```
//!
//! The redirect result and session changes arrive independently; `Done` is
//! reached the first time an authenticated snapshot is observed and is never
//! left, so one flow navigates at most once.

use super::client::PROTECTED_ROUTE;
use super::error::IdentityError;
use super::session::AuthState;

pub const CALLBACK_ERROR_MESSAGE: &str = "Failed to complete authentication. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackState {
    Pending,
    Error(String),
    Done(String),
}

/// Navigation emitted on entering `Done`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub target: String,
}

#[derive(Debug)]
pub struct CallbackFlow {
    state: CallbackState,
    /// Target restored from the original request, once the exchange succeeded
    restored_target: Option<String>,
}

impl Default for CallbackFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackFlow {
    pub fn new() -> Self {
        Self {
            state: CallbackState::Pending,
            restored_target: None,
        }
    }

    pub fn state(&self) -> &CallbackState {
        &self.state
    }

    /// Feed the outcome of `handle_login_redirect` together with the session
    /// snapshot at the time it completed.
    pub fn on_redirect_result(
        &mut self,
        result: Result<String, IdentityError>,
        snapshot: &AuthState,
    ) -> Option<Navigation> {
        if matches!(self.state, CallbackState::Done(_)) {
            return None;
        }

        match result {
            Ok(target) => {
                self.restored_target = Some(target);
            }
            Err(err) if err.is_redundant_redirect() && snapshot.is_authenticated => {
                tracing::debug!(
                    event = "callback_replay_suppressed",
                    "Ignoring redundant redirect completion for an authenticated session"
                );
            }
            Err(err) => {
                match &err {
                    IdentityError::AuthorizationDenied { error, description } => {
                        tracing::warn!(
                            error = %error,
                            description = ?description,
                            "Identity provider denied authorization"
                        );
                    }
                    other => {
                        tracing::error!(error = %other, "Authentication error");
                    }
                }
                self.state = CallbackState::Error(CALLBACK_ERROR_MESSAGE.to_string());
            }
        }

        self.on_session_change(snapshot)
    }

    /// React to a session state change; navigates once the session is authenticated
    pub fn on_session_change(&mut self, snapshot: &AuthState) -> Option<Navigation> {
        if !snapshot.is_authenticated || matches!(self.state, CallbackState::Done(_)) {
            return None;
        }

        let target = self
            .restored_target
            .take()
            .unwrap_or_else(|| PROTECTED_ROUTE.to_string());
        self.state = CallbackState::Done(target.clone());
        Some(Navigation { target })
    }
}
