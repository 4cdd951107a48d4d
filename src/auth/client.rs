//! Identity client
//!
//! The portal's single source of truth for authentication state. Built once
//! in `main`, shared through an axum `Extension`, started and shut down
//! explicitly. All views derive their rendering from [`AuthState`] snapshots
//! obtained here.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use oauth2::{CsrfToken, PkceCodeChallenge};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::claims::unix_now;
use super::error::IdentityError;
use super::helpers::sanitize_return_path;
use super::provider::IdentityProvider;
use super::session::{AuthState, IdToken, PendingClaim, PendingLogin, SessionStore};

/// Guarded route the callback sends users to by default
pub const PROTECTED_ROUTE: &str = "/protected";

/// Hook turning the originally requested URI into the post-login target
pub type RestoreOriginalUri = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Query parameters the identity provider appends to the redirect URI
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub pkce: bool,
    pub pending_login_ttl: Duration,
    pub reap_interval: Duration,
    pub post_logout_redirect_uri: String,
}

/// Result of starting a sign-in
#[derive(Debug)]
pub struct SignInRedirect {
    /// Session the pending login was stored in (may be newly created)
    pub session_id: String,
    /// Identity provider authorize URL
    pub url: String,
}

/// Result of completing the redirect
#[derive(Debug)]
pub struct LoginCompletion {
    /// Replacement for the pre-login session id
    pub session_id: String,
    /// Where to send the user next
    pub target: String,
}

/// Default restore hook: keep guarded destinations, send everything else to `/protected`
pub fn default_restore_original_uri(original_uri: &str) -> String {
    match sanitize_return_path(Some(original_uri)) {
        Some(path) if path == PROTECTED_ROUTE || path.starts_with("/protected/") => path,
        _ => PROTECTED_ROUTE.to_string(),
    }
}

pub struct IdentityClient {
    provider: Arc<dyn IdentityProvider>,
    sessions: SessionStore,
    settings: ClientSettings,
    restore_original_uri: RestoreOriginalUri,
    reaper: Mutex<Option<JoinHandle<()>>>,
}

impl IdentityClient {
    pub fn new(provider: Arc<dyn IdentityProvider>, settings: ClientSettings) -> Self {
        Self {
            provider,
            sessions: SessionStore::new(),
            settings,
            restore_original_uri: Arc::new(default_restore_original_uri),
            reaper: Mutex::new(None),
        }
    }

    /// Replace the post-login redirect restoration hook
    pub fn with_restore_original_uri(mut self, hook: RestoreOriginalUri) -> Self {
        self.restore_original_uri = hook;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start background housekeeping (expired session reaper)
    pub fn start(self: &Arc<Self>) {
        let client = Arc::clone(self);
        let interval = self.settings.reap_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = client
                    .sessions
                    .purge_expired(client.settings.pending_login_ttl)
                    .await;
                if removed > 0 {
                    tracing::debug!(event = "sessions_reaped", removed = removed, "Removed expired sessions");
                }
            }
        });

        let mut reaper = self.reaper.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = reaper.replace(handle) {
            previous.abort();
        }
        tracing::info!(
            reap_interval_secs = interval.as_secs(),
            "Identity client started"
        );
    }

    /// Stop housekeeping and drop every session
    pub async fn shutdown(&self) {
        let handle = self
            .reaper
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
        let count = self.sessions.len().await;
        self.sessions.clear().await;
        tracing::info!(dropped_sessions = count, "Identity client shut down");
    }

    pub async fn is_ready(&self) -> bool {
        self.provider.is_ready().await
    }

    // =========================================================================
    // Authentication state
    // =========================================================================

    /// Snapshot of the session's state; unauthenticated for unknown sessions
    pub async fn auth_state(&self, session_id: Option<&str>) -> AuthState {
        match session_id {
            Some(id) => match self.sessions.get(id).await {
                Some(session) => session.snapshot(),
                None => AuthState::default(),
            },
            None => AuthState::default(),
        }
    }

    /// Subscribe to a session's state changes
    pub async fn subscribe(&self, session_id: &str) -> Option<watch::Receiver<AuthState>> {
        self.sessions
            .get(session_id)
            .await
            .map(|session| session.subscribe())
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Begin the authorization code flow: store a pending login in the
    /// session (created if needed) and return the authorize URL.
    pub async fn sign_in_with_redirect(
        &self,
        session_id: Option<&str>,
        original_uri: &str,
    ) -> Result<SignInRedirect, IdentityError> {
        let (session_id, session) = self.sessions.get_or_create(session_id).await;

        let pkce_verifier = if self.settings.pkce {
            let (_, verifier) = PkceCodeChallenge::new_random_sha256();
            Some(verifier.secret().clone())
        } else {
            None
        };

        let pending = PendingLogin {
            state: CsrfToken::new_random().secret().clone(),
            nonce: CsrfToken::new_random().secret().clone(),
            pkce_verifier,
            original_uri: original_uri.to_string(),
            issued_at: Instant::now(),
        };

        let url = self.provider.authorization_url(&pending)?;
        session.set_pending(pending);

        tracing::info!(
            event = "sign_in_redirect",
            pkce = self.settings.pkce,
            original_uri = %original_uri,
            "Redirecting to identity provider"
        );

        Ok(SignInRedirect { session_id, url })
    }

    /// Complete the redirect: validate state, exchange the code, verify the
    /// ID token and mark the session authenticated under a fresh session id.
    /// Returns that id with the restored post-login target.
    ///
    /// A replayed callback (pending login already consumed) or one without
    /// code/state fails with [`IdentityError::NoTokenInUrl`]. A callback whose
    /// `state` does not match leaves the pending login untouched.
    pub async fn handle_login_redirect(
        &self,
        session_id: Option<&str>,
        params: &CallbackParams,
    ) -> Result<LoginCompletion, IdentityError> {
        let session = match session_id {
            Some(id) => self.sessions.get(id).await,
            None => None,
        };

        if let Some(error) = &params.error {
            if let (Some(session), Some(state)) = (&session, &params.state) {
                session.take_pending_if(|pending| pending.state == *state);
            }
            return Err(IdentityError::AuthorizationDenied {
                error: error.clone(),
                description: params.error_description.clone(),
            });
        }

        let (Some(code), Some(state)) = (&params.code, &params.state) else {
            return Err(IdentityError::NoTokenInUrl);
        };
        let (Some(session_id), Some(session)) = (session_id, session) else {
            return Err(IdentityError::NoTokenInUrl);
        };

        let pending = match session.take_pending_if(|pending| pending.state == *state) {
            PendingClaim::Taken(pending) => pending,
            PendingClaim::Rejected => return Err(IdentityError::StateMismatch),
            PendingClaim::Missing => return Err(IdentityError::NoTokenInUrl),
        };
        if pending.is_expired(self.settings.pending_login_ttl) {
            return Err(IdentityError::LoginExpired);
        }

        tracing::debug!(code_length = code.len(), "Exchanging authorization code");
        let tokens = self
            .provider
            .exchange_code(code, pending.pkce_verifier.as_deref())
            .await?;

        let raw = tokens.id_token.ok_or_else(|| {
            IdentityError::InvalidIdToken("token response carried no id_token".to_string())
        })?;
        let claims = self.provider.verify_id_token(&raw, &pending.nonce).await?;
        if claims.is_expired_at(unix_now()) {
            return Err(IdentityError::InvalidIdToken(
                "ID token is already expired".to_string(),
            ));
        }

        // The pre-login id may have been planted; only the new one is authenticated
        let session_id = self
            .sessions
            .rotate(session_id)
            .await
            .ok_or(IdentityError::LoginExpired)?;

        tracing::info!(
            event = "sign_in_complete",
            sub = ?claims.sub(),
            expires_in_secs = ?tokens.expires_in_secs,
            "Session authenticated"
        );
        session.authenticate(IdToken { raw, claims });

        Ok(LoginCompletion {
            session_id,
            target: (self.restore_original_uri)(&pending.original_uri),
        })
    }

    /// End the session. Returns the identity provider logout URL, if any.
    ///
    /// The session is only dropped once the logout URL could be built, so a
    /// failure leaves the user signed in.
    pub async fn sign_out(&self, session_id: Option<&str>) -> Result<Option<String>, IdentityError> {
        let Some(session_id) = session_id else {
            return Ok(None);
        };
        let state = self.auth_state(Some(session_id)).await;

        // Only hint with a token the provider will still accept
        let id_token_hint = state
            .id_token
            .as_ref()
            .filter(|t| !t.claims.is_expired_at(unix_now()))
            .map(|t| t.raw.as_str());

        let url = self
            .provider
            .end_session_url(id_token_hint, &self.settings.post_logout_redirect_uri)?;

        self.sessions.remove(session_id).await;
        tracing::info!(
            event = "sign_out",
            was_authenticated = state.is_authenticated,
            has_id_token_hint = id_token_hint.is_some(),
            "Session ended"
        );

        Ok(url)
    }
}
