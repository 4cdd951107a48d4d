use anyhow::Result;
use partner_portal::{
    auth::{oidc::OidcProvider, ClientSettings, IdentityClient},
    config::Config,
    web, AppState,
};
use std::{sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting partner portal");

    // Load configuration from environment
    let config = Config::load()?;
    tracing::info!(
        environment = ?config.environment,
        issuer = %config.oidc.issuer,
        client_id = %config.oidc.client_id,
        pkce = config.oidc.pkce,
        "Configuration loaded"
    );

    // Discovery, OAuth client and JWKS prefetch; fails fast on a bad issuer
    let provider = OidcProvider::discover(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize identity provider: {}", e))?;
    tracing::info!("Identity provider ready");

    let settings = ClientSettings {
        pkce: config.oidc.pkce,
        pending_login_ttl: Duration::from_secs(config.pending_login_ttl_secs),
        reap_interval: Duration::from_secs(config.session_reap_interval_secs),
        post_logout_redirect_uri: config.post_logout_redirect_uri(),
    };
    let identity = Arc::new(IdentityClient::new(Arc::new(provider), settings));
    identity.start();

    let state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        identity: identity.clone(),
    });

    let app = web::create_router(state);

    // Bind and serve
    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Partner portal listening on {}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    identity.shutdown().await;
    tracing::info!("Partner portal stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
