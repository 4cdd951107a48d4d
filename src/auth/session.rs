//! Authentication sessions
//!
//! One session per browser, keyed by an opaque random id held in the
//! `portal_session` cookie. Each session publishes its [`AuthState`] through a
//! `tokio::sync::watch` channel, so consumers can either take a snapshot or
//! subscribe and react to changes (sign-in completing, token expiry, sign-out).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use oauth2::CsrfToken;
use tokio::sync::{watch, RwLock};

use super::claims::{unix_now, IdTokenClaims};

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "portal_session";

/// A verified ID token and its decoded claims
#[derive(Debug, Clone, PartialEq)]
pub struct IdToken {
    pub raw: String,
    pub claims: IdTokenClaims,
}

/// Snapshot of a session's authentication state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub is_authenticated: bool,
    pub id_token: Option<IdToken>,
}

impl AuthState {
    pub fn authenticated(id_token: IdToken) -> Self {
        Self {
            is_authenticated: true,
            id_token: Some(id_token),
        }
    }

    /// Claims of the signed-in user; `None` when not authenticated
    pub fn claims(&self) -> Option<&IdTokenClaims> {
        if !self.is_authenticated {
            return None;
        }
        self.id_token.as_ref().map(|t| &t.claims)
    }
}

/// Login in flight between the authorize redirect and the callback
#[derive(Debug, Clone)]
pub struct PendingLogin {
    /// OAuth `state` parameter (CSRF protection)
    pub state: String,
    /// OIDC `nonce`, echoed back inside the ID token
    pub nonce: String,
    /// PKCE code verifier; `None` when PKCE is disabled
    pub pkce_verifier: Option<String>,
    /// URI the user originally asked for
    pub original_uri: String,
    pub issued_at: Instant,
}

impl PendingLogin {
    pub fn is_expired(&self, ttl: Duration) -> bool {
        self.issued_at.elapsed() >= ttl
    }
}

/// Outcome of [`Session::take_pending_if`]
#[derive(Debug)]
pub enum PendingClaim {
    Taken(PendingLogin),
    /// A login is pending but was not accepted; it stays in place
    Rejected,
    Missing,
}

pub struct Session {
    state: watch::Sender<AuthState>,
    pending: Mutex<Option<PendingLogin>>,
    created_at: Instant,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self {
            state,
            pending: Mutex::new(None),
            created_at: Instant::now(),
        }
    }

    fn pending_guard(&self) -> MutexGuard<'_, Option<PendingLogin>> {
        // The guarded value is a plain Option; a poisoned lock still holds a usable value
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state, downgrading (and notifying subscribers) if the ID token expired
    pub fn snapshot(&self) -> AuthState {
        self.snapshot_at(unix_now())
    }

    pub fn snapshot_at(&self, now: i64) -> AuthState {
        let current = self.state.borrow().clone();
        let expired = current.is_authenticated
            && current.claims().map_or(true, |c| c.is_expired_at(now));

        if expired {
            tracing::info!(
                event = "session_token_expired",
                sub = ?current.claims().and_then(|c| c.sub()),
                "ID token expired; session is no longer authenticated"
            );
            self.state.send_replace(AuthState::default());
            return AuthState::default();
        }
        current
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn set_pending(&self, pending: PendingLogin) {
        *self.pending_guard() = Some(pending);
    }

    /// Take the pending login; a second call returns `None`
    pub fn take_pending(&self) -> Option<PendingLogin> {
        self.pending_guard().take()
    }

    /// Take the pending login only when `accept` approves it
    pub fn take_pending_if<F>(&self, accept: F) -> PendingClaim
    where
        F: FnOnce(&PendingLogin) -> bool,
    {
        let mut guard = self.pending_guard();
        let accepted = match guard.as_ref() {
            Some(pending) => accept(pending),
            None => return PendingClaim::Missing,
        };
        if !accepted {
            return PendingClaim::Rejected;
        }
        match guard.take() {
            Some(pending) => PendingClaim::Taken(pending),
            None => PendingClaim::Missing,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending_guard().is_some()
    }

    pub fn authenticate(&self, id_token: IdToken) {
        self.state.send_replace(AuthState::authenticated(id_token));
    }

    pub fn clear(&self) {
        self.pending_guard().take();
        self.state.send_replace(AuthState::default());
    }

    /// Unauthenticated sessions whose login never completed within the TTL
    fn is_stale_at(&self, now: i64, pending_ttl: Duration) -> bool {
        if self.snapshot_at(now).is_authenticated {
            return false;
        }
        match self.pending_guard().as_ref() {
            Some(pending) => pending.is_expired(pending_ttl),
            None => self.created_at.elapsed() >= pending_ttl,
        }
    }
}

/// Generate an unguessable session id
pub fn new_session_id() -> String {
    CsrfToken::new_random().secret().clone()
}

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Look up the session for `id`, creating a fresh one (with a new id) if
    /// the id is absent or unknown. Unknown ids are never adopted.
    pub async fn get_or_create(&self, id: Option<&str>) -> (String, Arc<Session>) {
        if let Some(id) = id {
            if let Some(session) = self.get(id).await {
                return (id.to_string(), session);
            }
        }

        let id = new_session_id();
        let session = Arc::new(Session::new());
        self.sessions
            .write()
            .await
            .insert(id.clone(), session.clone());
        tracing::debug!(event = "session_created", "New portal session");
        (id, session)
    }

    /// Move the session under `id` to a freshly generated id; the old id
    /// stops resolving. `None` if `id` is unknown.
    pub async fn rotate(&self, id: &str) -> Option<String> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.remove(id)?;
        let new_id = new_session_id();
        sessions.insert(new_id.clone(), session);
        tracing::debug!(event = "session_rotated", "Portal session id replaced");
        Some(new_id)
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(id);
        if let Some(session) = &removed {
            session.clear();
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drop every session (shutdown)
    pub async fn clear(&self) {
        let mut sessions = self.sessions.write().await;
        for session in sessions.values() {
            session.clear();
        }
        sessions.clear();
    }

    /// Remove stale sessions; returns how many were dropped
    pub async fn purge_expired(&self, pending_ttl: Duration) -> usize {
        self.purge_expired_at(unix_now(), pending_ttl).await
    }

    pub async fn purge_expired_at(&self, now: i64, pending_ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_stale_at(now, pending_ttl));
        before - sessions.len()
    }
}
