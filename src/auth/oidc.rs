//! OpenID Connect provider backed by the `oauth2` crate
//!
//! Endpoints come from the issuer's discovery document; ID tokens are
//! verified against the provider JWKS by [`JwtValidator`].

use async_trait::async_trait;
use oauth2::{
    basic::{BasicErrorResponseType, BasicTokenType},
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointSet, ExtraTokenFields,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, StandardErrorResponse,
    StandardRevocableToken, StandardTokenIntrospectionResponse, StandardTokenResponse,
    TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};

use super::claims::{nonce_matches, IdTokenClaims};
use super::error::IdentityError;
use super::helpers::{build_end_session_url, create_http_client};
use super::jwt::JwtValidator;
use super::provider::{IdentityProvider, TokenSet};
use super::session::PendingLogin;
use crate::config::Config;

/// Custom extra fields to capture id_token from OIDC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcTokenFields {
    pub id_token: Option<String>,
}

impl ExtraTokenFields for OidcTokenFields {}

/// Type alias for our configured OAuth client with OIDC support
type ConfiguredOAuthClient = oauth2::Client<
    StandardErrorResponse<BasicErrorResponseType>,
    StandardTokenResponse<OidcTokenFields, BasicTokenType>,
    StandardTokenIntrospectionResponse<OidcTokenFields, BasicTokenType>,
    StandardRevocableToken,
    StandardErrorResponse<oauth2::RevocationErrorResponseType>,
    EndpointSet,            // HasAuthUrl
    oauth2::EndpointNotSet, // HasDeviceAuthUrl
    oauth2::EndpointNotSet, // HasIntrospectionUrl
    oauth2::EndpointNotSet, // HasRevocationUrl
    EndpointSet,            // HasTokenUrl
>;

/// Subset of the OpenID Provider Metadata the portal relies on
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

/// Discovery document location for an issuer
pub fn discovery_url(issuer: &str) -> String {
    format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    )
}

impl ProviderMetadata {
    /// Reject metadata that names a different issuer than the one configured
    pub fn check_issuer(&self, configured_issuer: &str) -> anyhow::Result<()> {
        let advertised = self.issuer.trim_end_matches('/');
        let configured = configured_issuer.trim_end_matches('/');
        if advertised != configured {
            anyhow::bail!(
                "Discovery issuer mismatch: configured {}, provider advertises {}",
                configured,
                advertised
            );
        }
        Ok(())
    }
}

/// Build the OAuth2 client from discovered endpoints
fn create_oauth_client(
    metadata: &ProviderMetadata,
    client_id: &str,
    client_secret: Option<&str>,
    redirect_uri: &str,
) -> Result<ConfiguredOAuthClient, String> {
    let auth_url = AuthUrl::new(metadata.authorization_endpoint.clone())
        .map_err(|e| format!("Invalid auth URL: {}", e))?;

    let token_url = TokenUrl::new(metadata.token_endpoint.clone())
        .map_err(|e| format!("Invalid token URL: {}", e))?;

    let redirect_url = RedirectUrl::new(redirect_uri.to_string())
        .map_err(|e| format!("Invalid redirect URL: {}", e))?;

    let mut client = oauth2::Client::new(ClientId::new(client_id.to_string()))
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url);

    // Public clients authenticate the exchange with PKCE alone
    if let Some(secret) = client_secret {
        client = client.set_client_secret(ClientSecret::new(secret.to_string()));
    }

    Ok(client)
}

pub struct OidcProvider {
    oauth_client: ConfiguredOAuthClient,
    http_client: reqwest::Client,
    validator: JwtValidator,
    client_id: String,
    scopes: Vec<String>,
    end_session_endpoint: Option<String>,
}

impl OidcProvider {
    /// Discover the provider, build the OAuth client and prefetch JWKS.
    pub async fn discover(config: &Config) -> anyhow::Result<Self> {
        let http_client = create_http_client(
            config.http_connect_timeout_secs,
            config.http_request_timeout_secs,
        )?;

        let url = discovery_url(&config.oidc.issuer);
        tracing::info!(url = %url, "Fetching OpenID provider metadata");

        let metadata: ProviderMetadata = http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to fetch discovery document: {}", e))?
            .error_for_status()
            .map_err(|e| anyhow::anyhow!("Discovery endpoint returned an error: {}", e))?
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse discovery document: {}", e))?;

        metadata.check_issuer(&config.oidc.issuer)?;

        tracing::info!(
            issuer = %metadata.issuer,
            authorization_endpoint = %metadata.authorization_endpoint,
            has_end_session = metadata.end_session_endpoint.is_some(),
            "OpenID provider metadata loaded"
        );

        let oauth_client = create_oauth_client(
            &metadata,
            &config.oidc.client_id,
            config.oidc.client_secret.as_deref(),
            &config.redirect_uri(),
        )
        .map_err(|e| anyhow::anyhow!("OAuth configuration error: {}", e))?;

        let validator = JwtValidator::new(
            metadata.jwks_uri.clone(),
            metadata.issuer.clone(),
            config.oidc.client_id.clone(),
            http_client.clone(),
            config.jwks_cache_ttl_secs,
        );

        // Prefetch JWKS at startup so /readyz returns 200 immediately
        validator
            .prefetch_jwks()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to prefetch JWKS at startup: {}", e))?;

        Ok(Self {
            oauth_client,
            http_client,
            validator,
            client_id: config.oidc.client_id.clone(),
            scopes: config.oidc.scopes.clone(),
            end_session_endpoint: metadata.end_session_endpoint,
        })
    }
}

#[async_trait]
impl IdentityProvider for OidcProvider {
    fn authorization_url(&self, pending: &PendingLogin) -> Result<String, IdentityError> {
        let state = CsrfToken::new(pending.state.clone());
        let mut request = self
            .oauth_client
            .authorize_url(move || state)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .add_extra_param("nonce", pending.nonce.clone());

        if let Some(verifier) = &pending.pkce_verifier {
            let challenge =
                PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(verifier.clone()));
            request = request.set_pkce_challenge(challenge);
        }

        let (url, _) = request.url();
        Ok(url.to_string())
    }

    async fn exchange_code(
        &self,
        code: &str,
        pkce_verifier: Option<&str>,
    ) -> Result<TokenSet, IdentityError> {
        let mut request = self
            .oauth_client
            .exchange_code(AuthorizationCode::new(code.to_string()));
        if let Some(verifier) = pkce_verifier {
            request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_string()));
        }

        let token_response = request
            .request_async(&self.http_client)
            .await
            .map_err(|e| IdentityError::TokenExchange(e.to_string()))?;

        Ok(TokenSet {
            id_token: token_response.extra_fields().id_token.clone(),
            expires_in_secs: token_response.expires_in().map(|d| d.as_secs()),
        })
    }

    async fn verify_id_token(
        &self,
        id_token: &str,
        expected_nonce: &str,
    ) -> Result<IdTokenClaims, IdentityError> {
        let claims = self
            .validator
            .validate_async(id_token)
            .await
            .map_err(|e| IdentityError::InvalidIdToken(e.to_string()))?;

        if !nonce_matches(&claims, expected_nonce) {
            tracing::warn!(sub = ?claims.sub(), "ID token nonce does not match the pending login");
            return Err(IdentityError::InvalidIdToken("nonce mismatch".to_string()));
        }

        Ok(claims)
    }

    fn end_session_url(
        &self,
        id_token_hint: Option<&str>,
        post_logout_redirect_uri: &str,
    ) -> Result<Option<String>, IdentityError> {
        let Some(endpoint) = &self.end_session_endpoint else {
            return Ok(None);
        };
        url::Url::parse(endpoint)
            .map_err(|e| IdentityError::Configuration(format!("Invalid end-session URL: {}", e)))?;

        Ok(Some(build_end_session_url(
            endpoint,
            &self.client_id,
            post_logout_redirect_uri,
            id_token_hint,
        )))
    }

    async fn is_ready(&self) -> bool {
        self.validator.is_jwks_cached().await
    }
}
