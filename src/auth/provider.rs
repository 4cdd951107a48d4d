//! Identity provider seam
//!
//! Everything the portal needs from the external OpenID Connect provider.
//! The production implementation is [`crate::auth::oidc::OidcProvider`];
//! tests substitute an in-memory provider.

use async_trait::async_trait;

use super::claims::IdTokenClaims;
use super::error::IdentityError;
use super::session::PendingLogin;

/// Tokens returned by a successful authorization code exchange
#[derive(Debug, Clone)]
pub struct TokenSet {
    pub id_token: Option<String>,
    pub expires_in_secs: Option<u64>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authorize endpoint URL for a login that is about to start
    fn authorization_url(&self, pending: &PendingLogin) -> Result<String, IdentityError>;

    /// Exchange an authorization code (plus PKCE verifier) for tokens
    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<TokenSet, IdentityError>;

    /// Verify signature, issuer, audience, expiry and nonce of an ID token
    async fn verify_id_token(
        &self,
        id_token: &str,
        expected_nonce: &str,
    ) -> Result<IdTokenClaims, IdentityError>;

    /// RP-initiated logout URL; `Ok(None)` if the provider has no end-session endpoint
    fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: &str,
    ) -> Result<Option<String>, IdentityError>;

    /// Whether signing keys are available (readiness)
    async fn is_ready(&self) -> bool;
}
