use anyhow::Result;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use authpool::config::DatabaseSource;
use authpool::store::{self, ConnectionProbe};
use authpool::{api, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authpool=info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::from_env()?;
    info!("authpool v{}", env!("CARGO_PKG_VERSION"));

    match config.database_source {
        DatabaseSource::Remote => info!("Using remote database connection"),
        DatabaseSource::Local => info!("Using local PostgreSQL database"),
    }
    info!(
        "Pool: size={} overflow={} recycle={:?} pre_ping={}",
        config.pool.size, config.pool.max_overflow, config.pool.recycle, config.pool.pre_ping
    );

    // Initialize the connection pool
    let pool = store::postgres::connect_lazy(
        &config.database_url,
        config.connect_timeout,
        config.pool.clone(),
    )?;
    match pool.check().await {
        Ok(()) => info!("Database connected ✓"),
        Err(e) => warn!("Database connection test failed: {e}. /health will report degraded"),
    }

    // Start pool maintenance
    let maintenance = tokio::spawn(store::maintenance_daemon(
        pool.clone(),
        config.maintenance_interval,
    ));

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), Arc::new(pool.clone())));

    // Build router
    let app = api::router(state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    maintenance.abort();
    pool.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
