use thiserror::Error;

/// Failures surfaced by the identity client
///
/// Callers branch on the variant, never on the message text.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum IdentityError {
    /// The callback URL carried no code/state, or the pending login it
    /// refers to was already consumed (redundant redirect completion)
    #[error("unable to parse a token from the url")]
    NoTokenInUrl,

    /// The identity provider redirected back with an OAuth error
    #[error("authorization denied: {error}")]
    AuthorizationDenied {
        error: String,
        description: Option<String>,
    },

    /// Callback state does not match the pending login (possible CSRF)
    #[error("state parameter does not match the pending login")]
    StateMismatch,

    /// The pending login outlived its TTL before the callback arrived
    #[error("login attempt expired")]
    LoginExpired,

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("identity token rejected: {0}")]
    InvalidIdToken(String),

    #[error("identity provider misconfigured: {0}")]
    Configuration(String),

    #[error("identity provider unreachable: {0}")]
    Network(String),
}

impl IdentityError {
    /// The one benign condition: a replayed or empty callback
    pub fn is_redundant_redirect(&self) -> bool {
        matches!(self, IdentityError::NoTokenInUrl)
    }
}
