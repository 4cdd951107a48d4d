use anyhow::{Context, Result};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::claims::IdTokenClaims;

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

// Non-RSA keys (EC, symmetric) have no n/e and are skipped
#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

struct JwksCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

pub struct JwtValidator {
    jwks_uri: String,
    /// Expected issuer (the configured OIDC issuer)
    expected_issuer: String,
    /// Expected audience (the client_id)
    expected_audience: String,
    client: reqwest::Client,
    jwks_cache: RwLock<Option<JwksCache>>,
    cache_ttl: Duration,
}

impl JwtValidator {
    /// Create an ID token validator (RS256 with JWKS)
    ///
    /// # Arguments
    /// * `jwks_uri` - JWKS endpoint from the provider discovery document
    /// * `expected_issuer` - Issuer the tokens must carry
    /// * `expected_audience` - Audience the tokens must carry (client_id)
    /// * `client` - HTTP client with timeouts already configured
    /// * `jwks_cache_ttl_secs` - JWKS cache TTL
    pub fn new(
        jwks_uri: String,
        expected_issuer: String,
        expected_audience: String,
        client: reqwest::Client,
        jwks_cache_ttl_secs: u64,
    ) -> Self {
        tracing::info!(
            jwks_uri = %jwks_uri,
            expected_issuer = %expected_issuer,
            expected_audience = %expected_audience,
            jwks_cache_ttl_secs = jwks_cache_ttl_secs,
            "ID token validator initialized with issuer and audience validation"
        );

        Self {
            jwks_uri,
            expected_issuer,
            expected_audience,
            client,
            jwks_cache: RwLock::new(None),
            cache_ttl: Duration::from_secs(jwks_cache_ttl_secs),
        }
    }

    /// Validate an ID token (fetches JWKS if not cached or expired)
    pub async fn validate_async(&self, token: &str) -> Result<IdTokenClaims> {
        tracing::debug!(token_len = token.len(), "Validating ID token");

        let header = decode_header(token).context("Invalid token header")?;
        let kid = header.kid.clone().context("Token missing kid")?;

        let decoding_key = match self.get_cached_key(&kid).await? {
            Some(key) => key,
            None => {
                // Key rotation: refresh once and try again
                tracing::warn!(kid = %kid, "Key ID not found in cache, forcing JWKS refresh");
                self.refresh_jwks().await?;

                match self.get_cached_key(&kid).await? {
                    Some(key) => key,
                    None => {
                        tracing::error!(kid = %kid, "Unknown key ID - kid not found in JWKS even after refresh");
                        anyhow::bail!("Unknown key ID: {}", kid);
                    }
                }
            }
        };

        let validation = self.validation();
        let token_data = match decode::<IdTokenClaims>(token, &decoding_key, &validation) {
            Ok(data) => data,
            Err(e) => {
                // Audit logging without the token itself
                let token_hash = format!("{:x}", md5::compute(token));
                tracing::error!(
                    error = ?e,
                    kid = %kid,
                    alg = ?header.alg,
                    token_hash = %token_hash,
                    token_len = token.len(),
                    "ID token validation failed"
                );
                anyhow::bail!("Token validation failed: {}", e);
            }
        };

        tracing::info!(
            sub = ?token_data.claims.sub(),
            "ID token validated successfully"
        );

        Ok(token_data.claims)
    }

    /// RS256 rules for ID tokens. No clock leeway: a session stops being
    /// authenticated the second `exp` passes, so validation must agree.
    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_issuer(&[&self.expected_issuer]);
        validation.set_audience(&[&self.expected_audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation
    }

    /// Check if JWKS is cached (for readiness checks)
    pub async fn is_jwks_cached(&self) -> bool {
        self.jwks_cache.read().await.is_some()
    }

    /// Prefetch JWKS at startup so readiness passes immediately
    pub async fn prefetch_jwks(&self) -> Result<()> {
        tracing::info!("Prefetching JWKS at startup for readiness");
        self.refresh_jwks().await
    }

    /// Get cached key if available and not expired
    async fn get_cached_key(&self, kid: &str) -> Result<Option<DecodingKey>> {
        {
            let cache = self.jwks_cache.read().await;
            if let Some(jwks_cache) = cache.as_ref() {
                if jwks_cache.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(jwks_cache.keys.get(kid).cloned());
                }
                tracing::info!(
                    elapsed_secs = jwks_cache.fetched_at.elapsed().as_secs(),
                    ttl_secs = self.cache_ttl.as_secs(),
                    "JWKS cache expired, will refresh"
                );
            }
        } // Lock is dropped here

        self.refresh_jwks().await?;

        let cache = self.jwks_cache.read().await;
        Ok(cache.as_ref().and_then(|c| c.keys.get(kid).cloned()))
    }

    /// Refresh JWKS cache from the identity provider
    async fn refresh_jwks(&self) -> Result<()> {
        tracing::info!(url = %self.jwks_uri, "Fetching JWKS from identity provider");

        let response: JwksResponse = self
            .client
            .get(&self.jwks_uri)
            .send()
            .await
            .context("Failed to fetch JWKS")?
            .error_for_status()
            .context("JWKS endpoint returned an error status")?
            .json()
            .await
            .context("Failed to parse JWKS")?;

        let keys = decoding_keys(response.keys)?;
        tracing::info!(key_count = keys.len(), "JWKS fetched successfully");

        let mut cache = self.jwks_cache.write().await;
        *cache = Some(JwksCache {
            keys,
            fetched_at: Instant::now(),
        });

        Ok(())
    }
}

fn decoding_keys(jwks: Vec<Jwk>) -> Result<HashMap<String, DecodingKey>> {
    let mut keys = HashMap::new();
    for jwk in jwks {
        let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n, jwk.e) else {
            continue;
        };
        if jwk.kty != "RSA" {
            continue;
        }
        let key = DecodingKey::from_rsa_components(&n, &e)
            .with_context(|| format!("Failed to create decoding key for kid {}", kid))?;
        tracing::debug!(kid = %kid, "Added key to cache");
        keys.insert(kid, key);
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwks_parsing_skips_non_rsa_keys() {
        let body = r#"{"keys": [
            {"kty": "EC", "kid": "ec1", "crv": "P-256", "x": "abc", "y": "def"},
            {"kty": "RSA", "kid": "rsa1", "alg": "RS256", "use": "sig",
             "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw",
             "e": "AQAB"},
            {"kty": "RSA", "n": "AQAB", "e": "AQAB"}
        ]}"#;

        let response: JwksResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.keys.len(), 3);

        let keys = decoding_keys(response.keys).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.contains_key("rsa1"));
    }

    #[test]
    fn test_validation_has_no_expiry_leeway() {
        let validator = JwtValidator::new(
            "https://idp.test/keys".to_string(),
            "https://idp.test".to_string(),
            "client".to_string(),
            reqwest::Client::new(),
            60,
        );
        let validation = validator.validation();
        assert_eq!(validation.leeway, 0);
        assert!(validation.validate_exp);
        assert_eq!(validation.algorithms, vec![Algorithm::RS256]);
    }

    #[tokio::test]
    async fn test_validator_starts_without_cached_keys() {
        let validator = JwtValidator::new(
            "https://idp.test/keys".to_string(),
            "https://idp.test".to_string(),
            "client".to_string(),
            reqwest::Client::new(),
            60,
        );
        assert!(!validator.is_jwks_cached().await);
    }

    #[tokio::test]
    async fn test_malformed_token_is_rejected_before_any_fetch() {
        let validator = JwtValidator::new(
            "http://127.0.0.1:9/keys".to_string(),
            "https://idp.test".to_string(),
            "client".to_string(),
            reqwest::Client::new(),
            60,
        );
        assert!(validator.validate_async("not-a-jwt").await.is_err());
        assert!(!validator.is_jwks_cached().await);
    }
}
