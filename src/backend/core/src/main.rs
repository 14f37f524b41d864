//! Lendit Server - Main entry point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use lendit_core::{
    api::{self, AppState, LendingDirectory},
    config::Config,
    middleware::{AuthConfig, Authenticator, TokenRefresher},
    observability,
    rbac::AuthorizationEngine,
    session::{JwtSessionService, RefreshTokenStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    observability::init("lendit-server", &config.observability)?;

    let metrics = match observability::install_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Prometheus exporter unavailable; /metrics disabled");
            None
        }
    };

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Lendit Server"
    );

    let mut auth_config = AuthConfig::from(&config.auth);
    if auth_config.jwt_secret.is_none() {
        tracing::warn!("No jwt_secret configured; tokens signed with an ephemeral secret will not survive a restart");
        auth_config.jwt_secret = Some(format!(
            "{}{}",
            uuid::Uuid::new_v4().simple(),
            uuid::Uuid::new_v4().simple()
        ));
    }
    let authenticator = Arc::new(Authenticator::new(auth_config)?);

    let store = RefreshTokenStore::new();
    let purge = store.spawn_purge_task(Duration::from_secs(config.auth.refresh_purge_interval_secs));
    let session = Arc::new(JwtSessionService::from_config(
        authenticator.clone(),
        store,
        &config.auth,
    ));
    let refresher = Arc::new(TokenRefresher::from_config(session, &config.session)?);

    let app_state = AppState {
        engine: AuthorizationEngine::with_defaults(),
        directory: LendingDirectory::new(),
        authenticator,
        refresher,
        metrics,
    };

    let app = api::build_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    purge.abort();
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
