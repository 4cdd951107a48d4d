use std::env;

use crate::access::admin::{AdminPortalUrls, BROKERAGES_ADMIN_URL, PARTNER_ADMIN_URL};

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

/// OpenID Connect client registration for this deployment
#[derive(Debug, Clone)]
pub struct OidcSettings {
    pub issuer: String,
    pub client_id: String,
    /// Public SPA-style registrations have no secret; PKCE covers them
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    pub pkce: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Environment configuration
    pub environment: Environment,

    // Server configuration
    pub server_host: String,
    pub server_port: u16,

    // Browser-visible origin of the portal (no trailing slash)
    pub portal_public_url: String,

    // Identity provider
    pub oidc: OidcSettings,

    // Cookie configuration (None = host-only cookie, Some = domain cookie)
    pub cookie_domain: Option<String>,

    // HTTP client timeout configuration (in seconds)
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,

    // JWKS cache configuration (in seconds)
    pub jwks_cache_ttl_secs: u64,

    // Session housekeeping (in seconds)
    pub pending_login_ttl_secs: u64,
    pub session_reap_interval_secs: u64,

    // External admin portals, keyed by user category
    pub admin_portals: AdminPortalUrls,
}

const DEFAULT_SCOPES: [&str; 3] = ["openid", "profile", "email"];

impl Config {
    /// Load configuration from environment variables using std::env::var
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Exactly one identity provider tenant is configured per process. There
    /// are no built-in issuer or client id defaults: the
    /// deployment environment supplies them.
    pub fn load_from<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());
        let required = |key: &str| {
            var(key).ok_or_else(|| anyhow::anyhow!("{} environment variable is required", key))
        };
        let number = |key: &str, default: u64| {
            var(key)
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        // Parse environment type
        let environment = match var("ENVIRONMENT")
            .unwrap_or_else(|| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };

        let issuer = required("OIDC_ISSUER")?.trim_end_matches('/').to_string();
        let issuer_url = url::Url::parse(&issuer)
            .map_err(|e| anyhow::anyhow!("OIDC_ISSUER is not a valid URL: {}", e))?;
        if environment == Environment::Production && issuer_url.scheme() != "https" {
            anyhow::bail!("OIDC_ISSUER must use https in production");
        }

        let client_id = required("OIDC_CLIENT_ID")?;
        let client_secret = var("OIDC_CLIENT_SECRET");

        let mut scopes: Vec<String> = match var("OIDC_SCOPES") {
            Some(raw) => raw
                .split([' ', ','])
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        };
        if !scopes.iter().any(|s| s == "openid") {
            scopes.insert(0, "openid".to_string());
        }

        let pkce = match var("OIDC_PKCE").map(|s| s.trim().to_lowercase()) {
            None => true,
            Some(v) => !matches!(v.as_str(), "0" | "false" | "no" | "off"),
        };
        if !pkce && client_secret.is_none() {
            anyhow::bail!("OIDC_PKCE may only be disabled for confidential clients (set OIDC_CLIENT_SECRET)");
        }

        let portal_public_url = required("PORTAL_PUBLIC_URL")?
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&portal_public_url)
            .map_err(|e| anyhow::anyhow!("PORTAL_PUBLIC_URL is not a valid URL: {}", e))?;

        // Optional variables with defaults
        let server_host = var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());

        let server_port = var("SERVER_PORT")
            .and_then(|s| s.trim().parse::<u16>().ok())
            .unwrap_or(3000);

        let cookie_domain = var("COOKIE_DOMAIN");

        let admin_portals = AdminPortalUrls {
            partner: var("ADMIN_PORTAL_URL_PARTNER")
                .unwrap_or_else(|| PARTNER_ADMIN_URL.to_string()),
            brokerages: var("ADMIN_PORTAL_URL_BROKERAGES")
                .unwrap_or_else(|| BROKERAGES_ADMIN_URL.to_string()),
        };

        Ok(Config {
            environment,
            server_host,
            server_port,
            portal_public_url,
            oidc: OidcSettings {
                issuer,
                client_id,
                client_secret,
                scopes,
                pkce,
            },
            cookie_domain,
            http_connect_timeout_secs: number("HTTP_CONNECT_TIMEOUT_SECS", 10),
            http_request_timeout_secs: number("HTTP_REQUEST_TIMEOUT_SECS", 30),
            jwks_cache_ttl_secs: number("JWKS_CACHE_TTL_SECS", 3600),
            pending_login_ttl_secs: number("PENDING_LOGIN_TTL_SECS", 600),
            session_reap_interval_secs: number("SESSION_REAP_INTERVAL_SECS", 60).max(1),
            admin_portals,
        })
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// OAuth redirect target: the portal origin plus `/login/callback`
    pub fn redirect_uri(&self) -> String {
        format!("{}/login/callback", self.portal_public_url)
    }

    /// Where the identity provider sends the browser after sign-out
    pub fn post_logout_redirect_uri(&self) -> String {
        format!("{}/", self.portal_public_url)
    }

    /// Get cookie security flags based on environment
    pub fn cookie_secure_flag(&self) -> &str {
        if self.is_production() {
            "; Secure"
        } else {
            ""
        }
    }

    /// Get cookie domain attribute string (empty if host-only cookie)
    pub fn cookie_domain_attr(&self) -> String {
        match &self.cookie_domain {
            Some(domain) => format!("; Domain={}", domain),
            None => String::new(),
        }
    }

    /// Get bind address for server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
